//! Environment facet: named resource pools with per-update inflow and decay.
//!
//! Runs before the data manager so that recorded resource levels reflect the
//! update that just happened.

use crate::archive::Archive;
use crate::context::Context;
use crate::error::{FacetError, Result};
use crate::facet::{Facet, FacetType};
use crate::facets::data::Provider;
use evoworld_data::{reserved, FacetId, PropertyValue, Update};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const ENVIRONMENT_TYPE: &str = "core.environment";
const ENVIRONMENT_VERSION: u32 = 1;

/// Prefix of the per-resource data ids this facet provides.
pub const RESOURCE_DATA_PREFIX: &str = "core.environment.resource.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub amount: f64,
    pub inflow: f64,
    /// Fraction of the pool lost per update.
    pub outflow: f64,
}

impl Resource {
    fn step(&mut self) {
        self.amount = self.amount * (1.0 - self.outflow) + self.inflow;
    }
}

#[derive(Default)]
pub struct EnvironmentManager {
    resources: Mutex<BTreeMap<String, Resource>>,
}

impl EnvironmentManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource pool. Returns `false` for an empty or taken name.
    pub fn define_resource(&self, name: &str, initial: f64, inflow: f64, outflow: f64) -> bool {
        if name.is_empty() {
            return false;
        }
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        if resources.contains_key(name) {
            return false;
        }
        resources.insert(
            name.to_string(),
            Resource {
                amount: initial.max(0.0),
                inflow,
                outflow: outflow.clamp(0.0, 1.0),
            },
        );
        true
    }

    #[must_use]
    pub fn amount(&self, name: &str) -> Option<f64> {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|r| r.amount)
    }

    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Resource> {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    #[must_use]
    pub fn resource_names(&self) -> Vec<String> {
        self.resources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Draws up to `requested` from a pool and returns what was actually
    /// taken; zero for an unknown resource.
    pub fn consume(&self, name: &str, requested: f64) -> f64 {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        match resources.get_mut(name) {
            Some(resource) => {
                let taken = requested.max(0.0).min(resource.amount);
                resource.amount -= taken;
                taken
            }
            None => 0.0,
        }
    }
}

impl Facet for EnvironmentManager {
    fn facet_type(&self) -> &str {
        ENVIRONMENT_TYPE
    }

    fn update_before(&self) -> FacetId {
        reserved::data_manager()
    }

    fn perform_update(&self, _ctx: &mut Context, _update: Update) {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        for resource in resources.values_mut() {
            resource.step();
        }
    }

    fn serialize(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.set_version(ENVIRONMENT_VERSION);
        let resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        archive.put("resources", resources.len())?;
        for (name, resource) in resources.iter() {
            let child = archive.child(name)?;
            child.set_object_type("core.environment.resource");
            child.put("amount", resource.amount)?;
            child.put("inflow", resource.inflow)?;
            child.put("outflow", resource.outflow)?;
        }
        Ok(())
    }
}

impl FacetType for EnvironmentManager {
    const TYPE_NAME: &'static str = ENVIRONMENT_TYPE;

    fn restore(archive: &dyn Archive) -> Result<Self> {
        archive.expect_type(ENVIRONMENT_TYPE, ENVIRONMENT_VERSION)?;
        let expected = archive.require_int("resources")?;
        let mut resources = BTreeMap::new();
        for name in archive.sub_object_ids() {
            let child = archive.require_sub_object(&name)?;
            resources.insert(
                name,
                Resource {
                    amount: child.require_float("amount")?,
                    inflow: child.require_float("inflow")?,
                    outflow: child.require_float("outflow")?,
                },
            );
        }
        if usize::try_from(expected).ok() != Some(resources.len()) {
            return Err(FacetError::archive(format!(
                "environment lists {expected} resources but archive holds {}",
                resources.len()
            )));
        }
        Ok(Self {
            resources: Mutex::new(resources),
        })
    }
}

impl Provider for EnvironmentManager {
    fn provides(&self) -> Vec<String> {
        self.resource_names()
            .into_iter()
            .map(|name| format!("{RESOURCE_DATA_PREFIX}{name}"))
            .collect()
    }

    fn provided_value(&self, data_id: &str) -> Option<PropertyValue> {
        let name = data_id.strip_prefix(RESOURCE_DATA_PREFIX)?;
        self.amount(name).map(PropertyValue::Float)
    }

    fn describe_provided_value(&self, data_id: &str) -> String {
        match data_id.strip_prefix(RESOURCE_DATA_PREFIX) {
            Some(name) => format!("Current amount of resource `{name}`"),
            None => String::new(),
        }
    }

    fn supports_concurrent_update(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_updates_before_data_manager() {
        let env = EnvironmentManager::new();
        assert_eq!(env.update_before(), reserved::data_manager());
        assert!(env.update_after().is_empty());
    }

    #[test]
    fn test_define_rejects_duplicates() {
        let env = EnvironmentManager::new();
        assert!(env.define_resource("glucose", 10.0, 0.0, 0.0));
        assert!(!env.define_resource("glucose", 5.0, 0.0, 0.0));
        assert!(!env.define_resource("", 5.0, 0.0, 0.0));
        assert_eq!(env.amount("glucose"), Some(10.0));
    }

    #[test]
    fn test_inflow_and_outflow() {
        let env = EnvironmentManager::new();
        env.define_resource("r", 100.0, 10.0, 0.5);
        let mut ctx = Context::default();
        env.perform_update(&mut ctx, Update::new(0));
        assert!(approx(env.amount("r").unwrap(), 60.0));
        env.perform_update(&mut ctx, Update::new(1));
        assert!(approx(env.amount("r").unwrap(), 40.0));
    }

    #[test]
    fn test_consume_is_bounded() {
        let env = EnvironmentManager::new();
        env.define_resource("r", 3.0, 0.0, 0.0);
        assert!(approx(env.consume("r", 2.0), 2.0));
        assert!(approx(env.consume("r", 2.0), 1.0));
        assert!(approx(env.consume("r", 2.0), 0.0));
        assert!(approx(env.consume("missing", 2.0), 0.0));
    }

    #[test]
    fn test_provides_resource_values() {
        let env = EnvironmentManager::new();
        env.define_resource("sugar", 4.5, 0.0, 0.0);
        assert_eq!(env.provides(), vec!["core.environment.resource.sugar"]);
        assert_eq!(
            env.provided_value("core.environment.resource.sugar"),
            Some(PropertyValue::Float(4.5))
        );
        assert_eq!(env.provided_value("core.environment.resource.salt"), None);
        assert_eq!(env.provided_value("sugar"), None);
    }

    #[test]
    fn test_serialize_restore() {
        let env = EnvironmentManager::new();
        env.define_resource("a", 1.0, 2.0, 0.25);
        env.define_resource("b", 7.0, 0.0, 0.0);
        let mut archive = MemoryArchive::new("environment");
        archive.set_object_type(ENVIRONMENT_TYPE);
        env.serialize(&mut archive).unwrap();

        let restored = EnvironmentManager::restore(&archive).unwrap();
        assert_eq!(restored.resource_names(), vec!["a", "b"]);
        assert_eq!(restored.resource("a"), env.resource("a"));
        assert_eq!(restored.amount("b"), Some(7.0));
    }

    #[test]
    fn test_restore_detects_missing_resource() {
        let env = EnvironmentManager::new();
        env.define_resource("a", 1.0, 0.0, 0.0);
        let mut archive = MemoryArchive::new("environment");
        archive.set_object_type(ENVIRONMENT_TYPE);
        env.serialize(&mut archive).unwrap();
        archive.discard_sub_object("a");
        assert!(EnvironmentManager::restore(&archive).is_err());
    }
}
