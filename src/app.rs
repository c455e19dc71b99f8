//! Headless simulation driver.
//!
//! [`Simulation`] assembles a world from an [`AppConfig`], advances it one
//! update at a time and writes checkpoints that can later be resumed with
//! [`Simulation::restore`].

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::model::config::AppConfig;
use crate::model::facets::{
    data_manager_of, environment_of, output_manager_of, systematics_of, DataFileRecorder,
    DataManager, EnvironmentManager, OutputManager, ProviderPtr, RecorderPtr, SystematicsManager,
};
use crate::model::{register_facet_types, Biota};
use evoworld_core::{reserved, Context, Metrics, RestoreReport, Update, World};
use evoworld_io::{restore_world, save_checkpoint, CheckpointHeader, SerializePolicy};

/// Identifier the biota facet is attached under.
pub const BIOTA_ID: &str = "biota";

pub struct Simulation {
    config: AppConfig,
    world: World,
    ctx: Context,
    /// Next update to perform.
    update: Update,
    run_id: Uuid,
    metrics: Metrics,
    biota: Arc<Biota>,
    data_file: Option<RecorderPtr>,
}

impl Simulation {
    /// Builds a fresh world: the four reserved facets plus a seeded biota.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        register_facet_types();

        let mut world = World::new();
        world.attach_facet(reserved::SYSTEMATICS, Arc::new(SystematicsManager::default()))?;

        let environment = EnvironmentManager::new();
        for resource in &config.environment.resources {
            environment.define_resource(
                &resource.name,
                resource.initial,
                resource.inflow,
                resource.outflow,
            );
        }
        world.attach_facet(reserved::ENVIRONMENT, Arc::new(environment))?;
        world.attach_facet(reserved::DATA_MANAGER, Arc::new(DataManager::new()))?;

        let output = OutputManager::new(&config.output.directory).with_context(|| {
            format!("creating output directory {}", config.output.directory)
        })?;
        world.attach_facet(reserved::OUTPUT_MANAGER, Arc::new(output))?;

        let biota = Arc::new(Biota::new(config.biota.clone()));
        world.attach_facet(BIOTA_ID, biota.clone())?;
        biota.link(&world)?;
        let seeded = biota.seed_population()?;

        let mut sim = Self {
            ctx: Context::new(config.world.seed),
            metrics: Metrics::new(config.logging.report_interval),
            config,
            world,
            update: Update::ZERO,
            run_id: Uuid::new_v4(),
            biota,
            data_file: None,
        };
        sim.wire(false)?;

        tracing::info!(
            run = %sim.run_id,
            seed = sim.config.world.seed,
            organisms = seeded,
            order = ?sim.world.update_order(),
            "simulation created"
        );
        Ok(sim)
    }

    /// Resumes a run from a checkpoint. The seed comes from `config`; the run
    /// id and update counter come from the checkpoint.
    pub fn restore<P: AsRef<Path>>(config: AppConfig, path: P) -> Result<(Self, RestoreReport)> {
        config.validate()?;
        register_facet_types();

        let path = path.as_ref();
        let (header, mut world, report) = restore_world(path)
            .with_context(|| format!("restoring checkpoint {}", path.display()))?;
        if !report.is_complete() {
            tracing::warn!(skipped = ?report.skipped, "checkpoint restored without some facets");
        }

        for id in [
            reserved::ENVIRONMENT,
            reserved::SYSTEMATICS,
            reserved::DATA_MANAGER,
        ] {
            anyhow::ensure!(world.contains(id), "restored world has no `{id}` facet");
        }
        if output_manager_of(&world).is_none() {
            let output = OutputManager::new(&config.output.directory)?;
            world.attach_facet(reserved::OUTPUT_MANAGER, Arc::new(output))?;
        }

        let biota = world
            .facet_as::<Biota>(BIOTA_ID)
            .ok_or_else(|| anyhow::anyhow!("restored world has no biota"))?;
        biota.link(&world)?;

        let mut sim = Self {
            ctx: Context::new(config.world.seed),
            metrics: Metrics::new(config.logging.report_interval),
            config,
            world,
            update: Update::new(header.update),
            run_id: header.run_id,
            biota,
            data_file: None,
        };
        sim.wire(true)?;
        for _ in &report.restored {
            sim.metrics.increment_counter("restore.restored");
        }
        for _ in &report.skipped {
            sim.metrics.increment_counter("restore.skipped");
        }

        tracing::info!(
            run = %sim.run_id,
            update = header.update,
            order_matches = report.order_matches,
            "simulation restored"
        );
        Ok((sim, report))
    }

    /// Registers data providers and, when configured, attaches the data file.
    fn wire(&mut self, append: bool) -> Result<()> {
        let data = data_manager_of(&self.world)
            .ok_or_else(|| anyhow::anyhow!("world has no data manager"))?;

        let mut providers: Vec<ProviderPtr> = Vec::new();
        if let Some(env) = environment_of(&self.world) {
            providers.push(env);
        }
        if let Some(sys) = systematics_of(&self.world) {
            providers.push(sys);
        }
        providers.push(self.biota.clone());
        for provider in providers {
            data.register_provider(provider);
        }

        let Some(data_file) = self.config.output.data_file.clone() else {
            return Ok(());
        };
        let output = output_manager_of(&self.world)
            .ok_or_else(|| anyhow::anyhow!("world has no output manager"))?;
        let file = if append {
            output.open_append(&data_file)?
        } else {
            output.open(&data_file)?
        };
        let data_ids = if self.config.output.data_ids.is_empty() {
            data.available()
        } else {
            self.config.output.data_ids.clone()
        };
        let recorder: RecorderPtr = Arc::new(DataFileRecorder::new(file, data_ids));
        data.attach_recorder(recorder.clone(), false)?;
        self.data_file = Some(recorder);
        Ok(())
    }

    /// Performs one world update.
    pub fn step(&mut self) {
        let started = Instant::now();
        self.ctx.reseed_for_update(self.update.discrete);
        self.world.perform_update(&mut self.ctx, self.update);
        self.metrics
            .record_update(self.update.discrete, started.elapsed(), self.world.len());
        self.update = self.update.next();
    }

    /// Runs `updates` updates, checkpointing on the configured interval and
    /// once more at the end when checkpointing is enabled.
    pub fn run(&mut self, updates: u64) -> Result<()> {
        let interval = self.config.checkpoint.interval;
        for _ in 0..updates {
            self.step();
            if interval > 0 && (self.update.discrete as u64).is_multiple_of(interval) {
                self.checkpoint()?;
            }
        }
        if interval > 0 && !(self.update.discrete as u64).is_multiple_of(interval) {
            self.checkpoint()?;
        }
        if let Some(output) = output_manager_of(&self.world) {
            output.flush_all()?;
        }
        Ok(())
    }

    /// Writes a checkpoint for the current update into the checkpoint
    /// directory and returns its path.
    pub fn checkpoint(&self) -> Result<PathBuf> {
        let path = Path::new(&self.config.checkpoint.directory)
            .join(format!("checkpoint-{:08}.ckpt", self.update.discrete));
        self.checkpoint_to(&path)?;
        Ok(path)
    }

    /// Writes a checkpoint for the current update to `path`.
    pub fn checkpoint_to(&self, path: &Path) -> Result<CheckpointHeader> {
        let policy = if self.config.checkpoint.require_complete {
            SerializePolicy::RequireComplete
        } else {
            SerializePolicy::BestEffort
        };
        let header = save_checkpoint(&self.world, path, self.run_id, self.update.discrete, policy)
            .with_context(|| format!("writing checkpoint {}", path.display()))?;
        if !header.is_complete() {
            self.metrics.increment_counter("checkpoint.incomplete");
        }
        self.metrics
            .record_checkpoint(self.update.discrete, &path.display().to_string());
        Ok(header)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn biota(&self) -> &Arc<Biota> {
        &self.biota
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next update to perform; equals the number of updates completed.
    pub fn update(&self) -> Update {
        self.update
    }

    pub fn environment(&self) -> Option<Arc<EnvironmentManager>> {
        environment_of(&self.world)
    }

    pub fn systematics(&self) -> Option<Arc<SystematicsManager>> {
        systematics_of(&self.world)
    }

    pub fn has_data_file(&self) -> bool {
        self.data_file.is_some()
    }
}
