pub mod macros;

use evoworld_core::{Archive, Context, Facet, FacetId, FacetType, Update, World};
use std::sync::{Arc, Mutex};

#[allow(dead_code)]
pub const RECORDING_TYPE: &str = "test.recording";

/// Shared log of facet identifiers in the order their updates ran.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Drains and returns everything recorded so far.
#[allow(dead_code)]
pub fn take(log: &CallLog) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

/// Facet with configurable ordering that records each update it performs.
#[allow(dead_code)]
pub struct RecordingFacet {
    id: String,
    before: String,
    after: String,
    log: CallLog,
}

#[allow(dead_code)]
impl RecordingFacet {
    pub fn new(id: &str, log: &CallLog) -> Self {
        Self {
            id: id.to_string(),
            before: String::new(),
            after: String::new(),
            log: Arc::clone(log),
        }
    }

    pub fn before(mut self, id: &str) -> Self {
        self.before = id.to_string();
        self
    }

    pub fn after(mut self, id: &str) -> Self {
        self.after = id.to_string();
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Facet for RecordingFacet {
    fn facet_type(&self) -> &str {
        RECORDING_TYPE
    }

    fn update_before(&self) -> FacetId {
        FacetId::new(&self.before)
    }

    fn update_after(&self) -> FacetId {
        FacetId::new(&self.after)
    }

    fn perform_update(&self, _ctx: &mut Context, _update: Update) {
        self.log.lock().unwrap().push(self.id.clone());
    }

    fn serialize(&self, archive: &mut dyn Archive) -> evoworld_core::Result<()> {
        archive.set_version(1);
        archive.put("id", self.id.as_str())?;
        archive.put("before", self.before.as_str())?;
        archive.put("after", self.after.as_str())?;
        Ok(())
    }
}

impl FacetType for RecordingFacet {
    const TYPE_NAME: &'static str = RECORDING_TYPE;

    /// Restored facets write to a fresh log.
    fn restore(archive: &dyn Archive) -> evoworld_core::Result<Self> {
        archive.expect_type(RECORDING_TYPE, 1)?;
        Ok(Self {
            id: archive.require_str("id")?.to_string(),
            before: archive.require_str("before")?.to_string(),
            after: archive.require_str("after")?.to_string(),
            log: call_log(),
        })
    }
}

/// Solved update order as plain strings.
#[allow(dead_code)]
pub fn order_of(world: &World) -> Vec<String> {
    world
        .update_order()
        .iter()
        .map(|id| id.to_string())
        .collect()
}

/// Position of `id` in the solved update order.
#[allow(dead_code)]
pub fn position(world: &World, id: &str) -> Option<usize> {
    world.update_order().iter().position(|f| f.as_str() == id)
}

/// Runs `count` consecutive updates starting at update zero.
#[allow(dead_code)]
pub fn run_updates(world: &World, ctx: &mut Context, count: i32) {
    for u in 0..count {
        world.perform_update(ctx, Update::new(u));
    }
}
