//! Hierarchical, versioned key/value containers used for checkpointing.
//!
//! An [`Archive`] is one object: an id, a type tag, a schema version, a map of
//! typed scalar properties and a set of named child archives. The world and
//! every facet write themselves into an archive during serialization; restore
//! reads them back. Properties and sub-objects are write-once.
//!
//! [`MemoryArchive`] is the in-memory backend. It is a plain serde value, so
//! the persistence layer can encode it however it likes.

use crate::error::{FacetError, Result};
use evoworld_data::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Abstract serialization container.
pub trait Archive {
    fn object_id(&self) -> &str;
    fn object_type(&self) -> &str;
    fn version(&self) -> u32;
    fn set_object_type(&mut self, object_type: &str);
    fn set_version(&mut self, version: u32);

    fn property_ids(&self) -> Vec<String>;
    fn property(&self, key: &str) -> Option<&PropertyValue>;
    /// Returns `false` if `key` is already defined; the old value is kept.
    fn define_property(&mut self, key: &str, value: PropertyValue) -> bool;

    fn sub_object_ids(&self) -> Vec<String>;
    fn sub_object(&self, id: &str) -> Option<&dyn Archive>;
    /// Creates a fresh child. Returns `None` if `id` is already defined.
    fn define_sub_object(&mut self, id: &str) -> Option<&mut dyn Archive>;
    /// Drops a child, e.g. one left half-written by a failed serializer.
    fn discard_sub_object(&mut self, id: &str) -> bool;
}

impl<'a> dyn Archive + 'a {
    /// Defines a property, failing on a duplicate key.
    pub fn put(&mut self, key: &str, value: impl Into<PropertyValue>) -> Result<()> {
        if self.define_property(key, value.into()) {
            Ok(())
        } else {
            Err(FacetError::archive(format!(
                "property `{key}` already defined on `{}`",
                self.object_id()
            )))
        }
    }

    /// Defines a child object, failing on a duplicate id.
    pub fn child(&mut self, id: &str) -> Result<&mut dyn Archive> {
        let parent = self.object_id().to_string();
        self.define_sub_object(id).ok_or_else(|| {
            FacetError::archive(format!("sub-object `{id}` already defined on `{parent}`"))
        })
    }

    pub fn require(&self, key: &str) -> Result<&PropertyValue> {
        self.property(key)
            .ok_or_else(|| FacetError::missing_property(key))
    }

    pub fn require_int(&self, key: &str) -> Result<i64> {
        self.require(key)?
            .as_int()
            .ok_or_else(|| FacetError::archive(format!("property `{key}` is not an integer")))
    }

    pub fn require_float(&self, key: &str) -> Result<f64> {
        self.require(key)?
            .as_float()
            .ok_or_else(|| FacetError::archive(format!("property `{key}` is not a number")))
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| FacetError::archive(format!("property `{key}` is not a string")))
    }

    pub fn require_sub_object(&self, id: &str) -> Result<&(dyn Archive + '_)> {
        self.sub_object(id)
            .ok_or_else(|| FacetError::MissingSubObject(id.to_string()))
    }

    /// Checks the type tag and that the version is not newer than `supported`.
    pub fn expect_type(&self, object_type: &str, supported: u32) -> Result<()> {
        if self.object_type() != object_type {
            return Err(FacetError::TypeMismatch {
                expected: object_type.to_string(),
                found: self.object_type().to_string(),
            });
        }
        if self.version() > supported {
            return Err(FacetError::UnsupportedVersion {
                object_type: object_type.to_string(),
                found: self.version(),
                supported,
            });
        }
        Ok(())
    }
}

/// In-memory archive backed by ordered maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryArchive {
    id: String,
    #[serde(rename = "type", default)]
    object_type: String,
    #[serde(default)]
    version: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    sub_objects: BTreeMap<String, MemoryArchive>,
}

impl MemoryArchive {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    /// Total number of objects in this tree, including `self`.
    #[must_use]
    pub fn object_count(&self) -> usize {
        1 + self
            .sub_objects
            .values()
            .map(MemoryArchive::object_count)
            .sum::<usize>()
    }
}

impl Archive for MemoryArchive {
    fn object_id(&self) -> &str {
        &self.id
    }

    fn object_type(&self) -> &str {
        &self.object_type
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_object_type(&mut self, object_type: &str) {
        self.object_type = object_type.to_string();
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn property_ids(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    fn define_property(&mut self, key: &str, value: PropertyValue) -> bool {
        if self.properties.contains_key(key) {
            return false;
        }
        self.properties.insert(key.to_string(), value);
        true
    }

    fn sub_object_ids(&self) -> Vec<String> {
        self.sub_objects.keys().cloned().collect()
    }

    fn sub_object(&self, id: &str) -> Option<&dyn Archive> {
        self.sub_objects.get(id).map(|a| a as &dyn Archive)
    }

    fn define_sub_object(&mut self, id: &str) -> Option<&mut dyn Archive> {
        if self.sub_objects.contains_key(id) {
            return None;
        }
        let child = self
            .sub_objects
            .entry(id.to_string())
            .or_insert_with(|| MemoryArchive::new(id));
        Some(child as &mut dyn Archive)
    }

    fn discard_sub_object(&mut self, id: &str) -> bool {
        self.sub_objects.remove(id).is_some()
    }
}
