//! Callbacks the engine invokes synchronously while a run progresses.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::{
    engine::{RunState, RunSummary, TickReport},
    error::SimulationError,
    snapshot::SnapshotWriter,
    world::World,
};

/// Every method defaults to doing nothing.
pub trait SimulationObserver {
    fn on_state_change(&mut self, _from: RunState, _to: RunState) {}

    fn on_simulation_start(&mut self, _world: &World, _seed: u64) {}

    fn on_tick_start(&mut self, _tick: u64) {}

    fn on_stage_complete(&mut self, _tick: u64, _stage: &str) {}

    fn on_tick_complete(&mut self, _report: &TickReport, _world: &World) {}

    fn on_simulation_end(&mut self, _summary: &RunSummary) {}

    fn on_error(&mut self, _error: &SimulationError) {}
}

/// Logs run progress through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl SimulationObserver for TracingObserver {
    fn on_state_change(&mut self, from: RunState, to: RunState) {
        debug!(?from, ?to, "run state changed");
    }

    fn on_simulation_start(&mut self, world: &World, seed: u64) {
        for (_, city) in world.cities() {
            debug!(
                city = %city.name,
                population = city.population(),
                capacity = ?city.capacity,
                "initial city state"
            );
        }
        info!(seed, "run started");
    }

    fn on_tick_complete(&mut self, report: &TickReport, world: &World) {
        debug!(
            tick = report.tick,
            flows = report.flows.len(),
            migrants = report.migrants,
            population_change = report.population_change,
            total_population = world.total_population(),
            skipped = ?report.skipped_stages,
            "tick complete"
        );
    }

    fn on_simulation_end(&mut self, summary: &RunSummary) {
        info!(
            reason = %summary.reason,
            ticks = summary.ticks,
            "run ended"
        );
    }

    fn on_error(&mut self, error: &SimulationError) {
        error!(error = %error, "run failed");
    }
}

/// Writes periodic JSON snapshots of the world and the tick's flows.
pub struct SnapshotObserver {
    writer: SnapshotWriter,
    scenario_name: String,
    written: Vec<PathBuf>,
}

impl SnapshotObserver {
    pub fn new(writer: SnapshotWriter, scenario_name: impl Into<String>) -> Self {
        Self {
            writer,
            scenario_name: scenario_name.into(),
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl SimulationObserver for SnapshotObserver {
    fn on_tick_complete(&mut self, report: &TickReport, world: &World) {
        match self.writer.maybe_write(world, report, &self.scenario_name) {
            Ok(Some(path)) => self.written.push(path),
            Ok(None) => {}
            Err(err) => warn!(tick = report.tick, error = %err, "snapshot not written"),
        }
    }
}
