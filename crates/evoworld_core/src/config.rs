//! Configuration management for world runs.
//!
//! Strongly-typed structures that map to `config.toml`. Every section has
//! defaults, so a partial file only overrides what it names.
//!
//! ## Example `config.toml`
//!
//! ```toml
//! [world]
//! seed = 42
//! updates = 500
//!
//! [checkpoint]
//! interval = 100
//! directory = "checkpoints"
//!
//! [[environment.resources]]
//! name = "glucose"
//! initial = 1000.0
//! inflow = 50.0
//! outflow = 0.01
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run-level parameters.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WorldConfig {
    pub seed: u64,
    /// Updates performed by the headless driver when `--updates` is absent.
    pub updates: u64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            updates: 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoint every `interval` updates; `0` disables periodic checkpoints.
    pub interval: u64,
    pub directory: String,
    /// Treat a facet that fails to serialize as a failed checkpoint.
    pub require_complete: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            interval: 0,
            directory: "checkpoints".to_string(),
            require_complete: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    /// Tab-separated data file written by the data manager, if set.
    pub data_file: Option<String>,
    /// Data ids recorded into `data_file`.
    pub data_ids: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "data".to_string(),
            data_file: None,
            data_ids: Vec::new(),
        }
    }
}

/// One environment resource.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    pub name: String,
    pub initial: f64,
    #[serde(default)]
    pub inflow: f64,
    /// Fraction of the current amount lost each update, in `[0, 1]`.
    #[serde(default)]
    pub outflow: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub resources: Vec<ResourceConfig>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            resources: vec![ResourceConfig {
                name: "glucose".to_string(),
                initial: 1000.0,
                inflow: 50.0,
                outflow: 0.01,
            }],
        }
    }
}

/// Stand-in population parameters.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BiotaConfig {
    pub initial_population: usize,
    pub capacity: usize,
    /// Energy an organism must hold to replicate; halved between parent and child.
    pub replication_cost: f64,
    /// Environment resource organisms feed on.
    pub resource: String,
    /// Resource drawn per organism per update.
    pub consumption: f64,
    pub max_age: u32,
    /// Per-site substitution probability on replication.
    pub mutation_rate: f64,
    pub ancestor_genome: String,
}

impl Default for BiotaConfig {
    fn default() -> Self {
        Self {
            initial_population: 20,
            capacity: 500,
            replication_cost: 10.0,
            resource: "glucose".to_string(),
            consumption: 1.0,
            max_age: 100,
            mutation_rate: 0.02,
            ancestor_genome: "abcdefghijklmnop".to_string(),
        }
    }
}

impl BiotaConfig {
    /// Bounds every population parameter must satisfy, whether it came from
    /// `config.toml` or a checkpoint.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.capacity > 0, "Biota capacity must be positive");
        anyhow::ensure!(
            self.initial_population <= self.capacity,
            "Initial population exceeds capacity"
        );
        anyhow::ensure!(
            self.replication_cost > 0.0,
            "Replication cost must be positive"
        );
        anyhow::ensure!(
            self.consumption >= 0.0,
            "Consumption must be non-negative"
        );
        anyhow::ensure!(self.max_age > 0, "Max age must be positive");
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.mutation_rate),
            "Mutation rate must be in [0.0, 1.0]"
        );
        anyhow::ensure!(
            !self.ancestor_genome.is_empty(),
            "Ancestor genome must not be empty"
        );
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Log a progress line every `report_interval` updates.
    pub report_interval: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            report_interval: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub world: WorldConfig,
    pub checkpoint: CheckpointConfig,
    pub output: OutputConfig,
    pub environment: EnvironmentConfig,
    pub biota: BiotaConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validates all configuration parameters.
    ///
    /// Returns `Err` describing the first failure.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.checkpoint.directory.is_empty(),
            "Checkpoint directory must not be empty"
        );
        anyhow::ensure!(
            !self.output.directory.is_empty(),
            "Output directory must not be empty"
        );
        anyhow::ensure!(
            self.output.data_file.is_none() || !self.output.data_ids.is_empty(),
            "A data file needs at least one data id"
        );

        for resource in &self.environment.resources {
            anyhow::ensure!(!resource.name.is_empty(), "Resource name must not be empty");
            anyhow::ensure!(
                resource.initial >= 0.0,
                "Resource `{}` initial amount must be non-negative",
                resource.name
            );
            anyhow::ensure!(
                resource.inflow >= 0.0,
                "Resource `{}` inflow must be non-negative",
                resource.name
            );
            anyhow::ensure!(
                (0.0..=1.0).contains(&resource.outflow),
                "Resource `{}` outflow must be in [0.0, 1.0]",
                resource.name
            );
        }
        let mut names: Vec<&str> = self
            .environment
            .resources
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        anyhow::ensure!(
            names.len() == self.environment.resources.len(),
            "Resource names must be unique"
        );

        self.biota.validate()?;

        anyhow::ensure!(
            self.logging.report_interval > 0,
            "Report interval must be positive"
        );
        Ok(())
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config = toml::from_str::<Self>(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` if it exists, otherwise returns validated defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Hash of the parameters that affect simulation outcomes.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.world.seed.to_le_bytes());
        hasher.update(format!("{:?}", self.environment).as_bytes());
        hasher.update(format!("{:?}", self.biota).as_bytes());
        hex::encode(hasher.finalize())
    }
}
