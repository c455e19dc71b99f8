//! Data manager facet: routes values from providers to recorders.
//!
//! Providers are registered per data id but only activated when a recorder
//! first asks for one of their ids. Each update the manager clears its value
//! cache, lets every active provider recompute, then notifies every recorder.
//! Values are pulled lazily through [`DataManager::current_value`] and cached
//! until the next update.

use crate::archive::Archive;
use crate::context::Context;
use crate::error::Result;
use crate::facet::{Facet, FacetType};
use crate::facets::output::OutputFile;
use evoworld_data::{reserved, PropertyValue, Update};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

const DATA_MANAGER_VERSION: u32 = 1;

pub const DATA_MANAGER_TYPE: &str = "core.datamanager";

/// Source of named data values.
pub trait Provider: Send + Sync {
    /// Every data id this provider can answer for.
    fn provides(&self) -> Vec<String>;

    /// Recomputes provided values for `update`. `Update::CONCURRENT` marks an
    /// out-of-band refresh requested when a recorder attaches mid-update.
    fn update_provided_values(&self, _update: Update) {}

    fn provided_value(&self, data_id: &str) -> Option<PropertyValue>;

    fn describe_provided_value(&self, _data_id: &str) -> String {
        String::new()
    }

    fn supports_concurrent_update(&self) -> bool {
        false
    }
}

pub type ProviderPtr = Arc<dyn Provider>;

/// Builds a provider on first demand.
pub type ProviderActivator = Arc<dyn Fn() -> Option<ProviderPtr> + Send + Sync>;

/// Lookup handed to recorders during notification.
pub type DataRetrieval<'a> = &'a dyn Fn(&str) -> Option<PropertyValue>;

/// Consumer of data values.
pub trait Recorder: Send + Sync {
    fn requested_data(&self) -> Vec<String>;

    fn notify_data(&self, update: Update, retrieve: DataRetrieval<'_>);
}

pub type RecorderPtr = Arc<dyn Recorder>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("data id must not be empty")]
    EmptyDataId,

    #[error("data id `{0}` is not available")]
    Unavailable(String),

    #[error("provider for `{0}` failed to activate")]
    ActivationFailed(String),
}

#[derive(Default)]
struct Registry {
    activators: HashMap<String, ProviderActivator>,
    available: BTreeSet<String>,
    active: HashMap<String, ProviderPtr>,
    active_providers: Vec<ProviderPtr>,
}

#[derive(Default)]
pub struct DataManager {
    registry: RwLock<Registry>,
    recorders: Mutex<Vec<RecorderPtr>>,
    current_values: Mutex<HashMap<String, PropertyValue>>,
}

impl DataManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an activator for `data_id`. Returns `false` for an empty id
    /// or one that is already registered.
    pub fn register_data(&self, data_id: &str, activator: ProviderActivator) -> bool {
        if data_id.is_empty() {
            return false;
        }
        let mut reg = self.registry.write().unwrap_or_else(|e| e.into_inner());
        if reg.activators.contains_key(data_id) {
            return false;
        }
        reg.activators.insert(data_id.to_string(), activator);
        reg.available.insert(data_id.to_string());
        true
    }

    /// Registers every id `provider` provides, activating to `provider`
    /// itself. Returns how many ids were newly registered.
    pub fn register_provider(&self, provider: ProviderPtr) -> usize {
        provider
            .provides()
            .iter()
            .filter(|id| {
                let shared = Arc::clone(&provider);
                self.register_data(id, Arc::new(move || Some(Arc::clone(&shared))))
            })
            .count()
    }

    /// Sorted set of every registered data id.
    #[must_use]
    pub fn available(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .available
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_available(&self, data_id: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .activators
            .contains_key(data_id)
    }

    #[must_use]
    pub fn is_active(&self, data_id: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .contains_key(data_id)
    }

    /// Description of an active data id; empty when unknown or inactive.
    #[must_use]
    pub fn describe(&self, data_id: &str) -> String {
        let provider = self
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .get(data_id)
            .cloned();
        provider
            .map(|p| p.describe_provided_value(data_id))
            .unwrap_or_default()
    }

    /// Attaches `recorder` once every id it requests is available, activating
    /// providers as needed. With `concurrent_update`, providers that support
    /// it refresh immediately and the recorder is notified with
    /// `Update::CONCURRENT`.
    pub fn attach_recorder(
        &self,
        recorder: RecorderPtr,
        concurrent_update: bool,
    ) -> std::result::Result<(), DataError> {
        let requested = recorder.requested_data();
        let mut touched: Vec<ProviderPtr> = Vec::new();
        {
            let mut reg = self.registry.write().unwrap_or_else(|e| e.into_inner());
            for data_id in &requested {
                if data_id.is_empty() {
                    return Err(DataError::EmptyDataId);
                }
                if !reg.activators.contains_key(data_id) {
                    return Err(DataError::Unavailable(data_id.clone()));
                }
            }

            // Nothing is committed unless every requested id activates.
            let mut staged: HashMap<String, ProviderPtr> = HashMap::new();
            let mut staged_providers: Vec<ProviderPtr> = Vec::new();
            for data_id in &requested {
                if let Some(provider) = reg.active.get(data_id).or_else(|| staged.get(data_id)) {
                    push_unique(&mut touched, provider);
                    continue;
                }
                let provider = reg
                    .activators
                    .get(data_id)
                    .and_then(|activate| activate())
                    .ok_or_else(|| DataError::ActivationFailed(data_id.clone()))?;
                push_unique(&mut touched, &provider);

                let mut is_providing = false;
                for provided in provider.provides() {
                    if !reg.active.contains_key(&provided) && !staged.contains_key(&provided) {
                        staged.insert(provided, Arc::clone(&provider));
                        is_providing = true;
                    }
                }
                if is_providing {
                    push_unique(&mut staged_providers, &provider);
                }
            }

            reg.active.extend(staged);
            for provider in staged_providers {
                if !reg.active_providers.iter().any(|p| Arc::ptr_eq(p, &provider)) {
                    reg.active_providers.push(provider);
                }
            }
        }

        if concurrent_update {
            for provider in touched.iter().filter(|p| p.supports_concurrent_update()) {
                provider.update_provided_values(Update::CONCURRENT);
                let mut cache = self
                    .current_values
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                for provided in provider.provides() {
                    cache.remove(&provided);
                }
            }
            recorder.notify_data(Update::CONCURRENT, &|id| self.current_value(id));
        }

        self.recorders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(recorder);
        Ok(())
    }

    /// Removes a previously attached recorder. Providers stay active.
    pub fn detach_recorder(&self, recorder: &RecorderPtr) -> bool {
        let mut recorders = self.recorders.lock().unwrap_or_else(|e| e.into_inner());
        let before = recorders.len();
        recorders.retain(|r| !Arc::ptr_eq(r, recorder));
        recorders.len() != before
    }

    #[must_use]
    pub fn recorder_count(&self) -> usize {
        self.recorders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Current value of an active data id, cached for the rest of the update.
    #[must_use]
    pub fn current_value(&self, data_id: &str) -> Option<PropertyValue> {
        if let Some(value) = self
            .current_values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(data_id)
        {
            return Some(value.clone());
        }
        let provider = self
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .active
            .get(data_id)
            .cloned()?;
        let value = provider.provided_value(data_id)?;
        self.current_values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(data_id.to_string(), value.clone());
        Some(value)
    }
}

fn push_unique(set: &mut Vec<ProviderPtr>, provider: &ProviderPtr) {
    if !set.iter().any(|p| Arc::ptr_eq(p, provider)) {
        set.push(Arc::clone(provider));
    }
}

impl Facet for DataManager {
    fn facet_type(&self) -> &str {
        DATA_MANAGER_TYPE
    }

    fn perform_update(&self, _ctx: &mut Context, update: Update) {
        self.current_values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();

        let providers = self
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .active_providers
            .clone();
        for provider in &providers {
            provider.update_provided_values(update);
        }

        let recorders = self
            .recorders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for recorder in &recorders {
            recorder.notify_data(update, &|id| self.current_value(id));
        }
    }

    fn serialize(&self, archive: &mut dyn Archive) -> Result<()> {
        archive.set_version(DATA_MANAGER_VERSION);
        let available = self.available();
        archive.put("available.count", available.len())?;
        for (i, id) in available.iter().enumerate() {
            archive.put(&format!("available.{i}"), id.as_str())?;
        }
        archive.put("recorders", self.recorder_count())
    }
}

impl FacetType for DataManager {
    const TYPE_NAME: &'static str = DATA_MANAGER_TYPE;

    /// Providers and recorders hold live handles into other facets, so a
    /// restored manager starts empty and is re-populated by its owner.
    fn restore(archive: &dyn Archive) -> Result<Self> {
        archive.expect_type(DATA_MANAGER_TYPE, DATA_MANAGER_VERSION)?;
        Ok(Self::new())
    }
}

/// In-memory series of one data id.
pub struct TimeSeriesRecorder {
    data_id: String,
    entries: Mutex<Vec<(Update, PropertyValue)>>,
}

impl TimeSeriesRecorder {
    pub fn new(data_id: impl Into<String>) -> Self {
        Self {
            data_id: data_id.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn data_id(&self) -> &str {
        &self.data_id
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(Update, PropertyValue)> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `update:value` pairs joined by commas.
    #[must_use]
    pub fn as_string(&self) -> String {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for (i, (update, value)) in entries.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{}:{value}", update.discrete);
        }
        out
    }
}

impl Recorder for TimeSeriesRecorder {
    fn requested_data(&self) -> Vec<String> {
        vec![self.data_id.clone()]
    }

    fn notify_data(&self, update: Update, retrieve: DataRetrieval<'_>) {
        if let Some(value) = retrieve(&self.data_id) {
            self.entries
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((update, value));
        }
    }
}

/// Writes one tab-separated row per update to an output file.
pub struct DataFileRecorder {
    file: Arc<OutputFile>,
    data_ids: Vec<String>,
    header_written: Mutex<bool>,
}

impl DataFileRecorder {
    /// The header row is skipped when `file` resumes an existing file.
    pub fn new(file: Arc<OutputFile>, data_ids: Vec<String>) -> Self {
        let header_written = file.is_resumed();
        Self {
            file,
            data_ids,
            header_written: Mutex::new(header_written),
        }
    }

    #[must_use]
    pub fn file(&self) -> &Arc<OutputFile> {
        &self.file
    }
}

impl Recorder for DataFileRecorder {
    fn requested_data(&self) -> Vec<String> {
        self.data_ids.clone()
    }

    fn notify_data(&self, update: Update, retrieve: DataRetrieval<'_>) {
        if update.is_concurrent() {
            return;
        }
        let mut header_written = self
            .header_written
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if !*header_written {
            let header = format!("# update\t{}", self.data_ids.join("\t"));
            if let Err(err) = self.file.write_line(&header) {
                tracing::warn!(file = %self.file.id(), error = %err, "data file header write failed");
                return;
            }
            *header_written = true;
        }

        let mut row = update.discrete.to_string();
        for id in &self.data_ids {
            row.push('\t');
            match retrieve(id) {
                Some(value) => {
                    let _ = write!(row, "{value}");
                }
                None => row.push('-'),
            }
        }
        if let Err(err) = self.file.write_line(&row) {
            tracing::warn!(file = %self.file.id(), error = %err, "data file write failed");
        }
    }
}

/// Data manager handle for a world's reserved slot.
#[must_use]
pub fn data_manager_of(world: &crate::world::World) -> Option<Arc<DataManager>> {
    world.facet_as::<DataManager>(reserved::DATA_MANAGER)
}
