//! Per-run state handed to every facet during an update.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Diagnostics sink for facets. Messages go to `tracing`; counts are kept so
/// a driver can decide whether a run stayed healthy.
#[derive(Debug, Default, Clone)]
pub struct Feedback {
    errors: u64,
    warnings: u64,
    notifications: u64,
}

impl Feedback {
    pub fn error(&mut self, message: &str) {
        self.errors += 1;
        tracing::error!(message);
    }

    pub fn warning(&mut self, message: &str) {
        self.warnings += 1;
        tracing::warn!(message);
    }

    pub fn notify(&mut self, message: &str) {
        self.notifications += 1;
        tracing::info!(message);
    }

    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.errors
    }

    #[must_use]
    pub fn warning_count(&self) -> u64 {
        self.warnings
    }

    #[must_use]
    pub fn notification_count(&self) -> u64 {
        self.notifications
    }
}

/// Mutable shared state reachable from `Facet::perform_update`.
pub struct Context {
    seed: u64,
    rng: ChaCha8Rng,
    feedback: Feedback,
}

impl Context {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
            feedback: Feedback::default(),
        }
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Switches to the random stream for `update` under the run seed, so a
    /// run restored from a checkpoint draws the same numbers as the
    /// uninterrupted run. Distinct `(seed, update)` pairs never share a stream.
    pub fn reseed_for_update(&mut self, update: i32) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(u64::from(update as u32));
        self.rng = rng;
    }

    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    #[must_use]
    pub fn feedback(&self) -> &Feedback {
        &self.feedback
    }

    pub fn feedback_mut(&mut self) -> &mut Feedback {
        &mut self.feedback
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(0)
    }
}
