use anyhow::{anyhow, Result};

use crate::models::{MigrationFlow, ResidenceAttraction};
use crate::rng::RngManager;

/// Per-city populations immediately before and after flows were applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationChange {
    pub previous: Vec<u64>,
    pub current: Vec<u64>,
}

impl PopulationChange {
    /// Sum over cities of `|current - previous|`.
    pub fn total_absolute_change(&self) -> u64 {
        self.previous
            .iter()
            .zip(&self.current)
            .map(|(before, after)| before.abs_diff(*after))
            .sum()
    }
}

/// State handed from stage to stage within a single tick.
///
/// Each stage output is a named slot; reading a slot that an earlier stage did not
/// fill is an error rather than a silent default.
#[derive(Debug)]
pub struct TickContext {
    pub tick: u64,
    pub rng: RngManager,
    attraction: Option<Vec<ResidenceAttraction>>,
    flows: Option<Vec<MigrationFlow>>,
    population_change: Option<PopulationChange>,
}

impl TickContext {
    pub fn new(tick: u64, rng: RngManager) -> Self {
        Self {
            tick,
            rng,
            attraction: None,
            flows: None,
            population_change: None,
        }
    }

    pub fn set_attraction(&mut self, attraction: Vec<ResidenceAttraction>) {
        self.attraction = Some(attraction);
    }

    pub fn attraction(&self) -> Result<&[ResidenceAttraction]> {
        self.attraction
            .as_deref()
            .ok_or_else(|| anyhow!("attraction results were not produced this tick"))
    }

    pub fn set_flows(&mut self, flows: Vec<MigrationFlow>) {
        self.flows = Some(flows);
    }

    pub fn flows(&self) -> Result<&[MigrationFlow]> {
        self.flows
            .as_deref()
            .ok_or_else(|| anyhow!("migration flows were not decided this tick"))
    }

    pub fn set_population_change(&mut self, change: PopulationChange) {
        self.population_change = Some(change);
    }

    pub fn population_change(&self) -> Result<&PopulationChange> {
        self.population_change
            .as_ref()
            .ok_or_else(|| anyhow!("flows were not executed this tick"))
    }

    pub(crate) fn take_flows(&mut self) -> Vec<MigrationFlow> {
        self.flows.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_outputs_are_errors() {
        let ctx = TickContext::new(1, RngManager::new(1));
        assert!(ctx.attraction().is_err());
        assert!(ctx.flows().is_err());
        let message = ctx.population_change().unwrap_err().to_string();
        assert!(message.contains("not executed"));
    }

    #[test]
    fn absolute_change_counts_both_directions() {
        let change = PopulationChange {
            previous: vec![100, 50, 7],
            current: vec![90, 60, 7],
        };
        assert_eq!(change.total_absolute_change(), 20);
    }
}
