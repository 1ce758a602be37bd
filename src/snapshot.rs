use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::engine::TickReport;
use crate::models::MigrationFlow;
use crate::world::{CityId, World, WorldSnapshot};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct TickSnapshot<'a> {
    scenario: &'a str,
    tick: u64,
    migrants: u64,
    population_change: u64,
    world: WorldSnapshot,
    flows: Vec<FlowRecord<'a>>,
}

#[derive(Serialize)]
struct FlowRecord<'a> {
    origin: &'a str,
    destination: &'a str,
    unit: &'a str,
    count: u64,
    probability: f64,
    differential: f64,
}

impl<'a> FlowRecord<'a> {
    fn resolve(world: &'a World, flow: &MigrationFlow) -> Self {
        let city_name =
            |id: CityId| -> &'a str { world.city(id).map_or("?", |c| c.name.as_str()) };
        Self {
            origin: city_name(flow.origin),
            destination: city_name(flow.destination),
            unit: world.unit(flow.unit).map_or("?", |u| u.name.as_str()),
            count: flow.count,
            probability: flow.probability,
            differential: flow.differential,
        }
    }
}

/// Writes `<dir>/<scenario>/tick_NNNNNN.json` every `interval_ticks` ticks.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval_ticks: u64,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval_ticks: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval_ticks,
        }
    }

    pub fn maybe_write(
        &self,
        world: &World,
        report: &TickReport,
        scenario_name: &str,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        if self.interval_ticks == 0 || report.tick % self.interval_ticks != 0 {
            return Ok(None);
        }

        let dir = self.dir.join(scenario_name);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("tick_{:06}.json", report.tick));
        let snapshot = TickSnapshot {
            scenario: scenario_name,
            tick: report.tick,
            migrants: report.migrants,
            population_change: report.population_change,
            world: world.snapshot(),
            flows: report
                .flows
                .iter()
                .map(|flow| FlowRecord::resolve(world, flow))
                .collect(),
        };
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(Some(path))
    }
}
