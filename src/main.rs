use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use citymig::{
    engine::EngineBuilder,
    observer::{SnapshotObserver, TracingObserver},
    scenario::ScenarioLoader,
    snapshot::SnapshotWriter,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "City population migration runner")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/two_cities.yaml")]
    scenario: PathBuf,

    /// Override max_ticks from the scenario
    #[arg(long)]
    ticks: Option<u64>,

    /// Override random_seed from the scenario
    #[arg(long)]
    seed: Option<u64>,

    /// Override snapshot interval in ticks (0 disables snapshots)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let mut world = scenario.build_world()?;

    let mut config = scenario.config.clone();
    if let Some(ticks) = cli.ticks {
        config.max_ticks = ticks;
    }
    if cli.seed.is_some() {
        config.random_seed = cli.seed;
    }
    let snapshot_interval = cli
        .snapshot_interval
        .unwrap_or(scenario.snapshot_interval_ticks);
    let snapshot_dir = cli
        .snapshot_dir
        .unwrap_or_else(|| PathBuf::from("snapshots"));

    let mut engine = EngineBuilder::new(config)
        .with_observer(TracingObserver)
        .with_observer(SnapshotObserver::new(
            SnapshotWriter::new(snapshot_dir, snapshot_interval),
            scenario.name.clone(),
        ))
        .build()?;

    let summary = engine.run(&mut world)?;
    println!(
        "Scenario '{}' ended after {} ticks: {} (seed {})",
        scenario.name, summary.ticks, summary.reason, summary.seed
    );
    for (_, city) in world.cities() {
        println!("  {:<20} {:>12}", city.name, city.population());
    }
    println!("  {:<20} {:>12}", "total", summary.total_population);
    Ok(())
}
