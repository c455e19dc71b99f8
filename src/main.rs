use anyhow::Result;
use clap::Parser;
use evoworld_core::init_logging;
use evoworld_lib::model::config::AppConfig;
use evoworld_lib::Simulation;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path; defaults are used when it does not exist
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Number of updates to run; overrides `world.updates`
    #[arg(short, long)]
    updates: Option<u64>,

    /// Resume from a checkpoint file
    #[arg(short, long)]
    restore: Option<String>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log level used when RUST_LOG is unset; overrides `logging.level`
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(Path::new(&args.config))?;
    if let Some(seed) = args.seed {
        config.world.seed = seed;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging.level);

    let updates = args.updates.unwrap_or(config.world.updates);
    let mut sim = match args.restore {
        Some(path) => {
            let (sim, report) = Simulation::restore(config, &path)?;
            if !report.order_matches {
                tracing::warn!("restored update order differs from the checkpoint");
            }
            sim
        }
        None => Simulation::new(config)?,
    };

    sim.run(updates)?;

    let order: Vec<String> = sim
        .world()
        .update_order()
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!("Run:         {}", sim.run_id());
    println!("Updates:     {}", sim.update().discrete);
    println!("Order:       {}", order.join(" -> "));
    println!("Population:  {}", sim.biota().population());
    if let Some(sys) = sim.systematics() {
        println!("Genotypes:   {} active, {} total", sys.active_count(), sys.total_count());
    }
    println!("Elapsed:     {:.2?}", sim.metrics().elapsed());
    let warnings = sim.context().feedback().warning_count();
    if warnings > 0 {
        println!("Warnings:    {warnings}");
    }
    Ok(())
}
