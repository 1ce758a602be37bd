use anyhow::{anyhow, ensure, Context, Result};

use crate::{
    engine::{PopulationChange, TickContext},
    stages::Stage,
    world::World,
};

/// Moves migrants between cities.
///
/// All origins are debited before any destination is credited, so the outcome
/// does not depend on flow order.
#[derive(Debug, Default)]
pub struct ExecutionStage;

impl ExecutionStage {
    pub fn new() -> Self {
        Self
    }
}

impl Stage for ExecutionStage {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn run(&mut self, ctx: &mut TickContext, world: &mut World) -> Result<()> {
        let flows = ctx.flows()?;
        let previous = world.populations();
        let total_before: u64 = previous.iter().sum();

        for flow in flows {
            let city = world
                .city_mut(flow.origin)
                .with_context(|| format!("flow leaves unknown city {:?}", flow.origin))?;
            let name = city.name.clone();
            let residents = city
                .residents
                .get_mut(&flow.unit)
                .filter(|count| **count >= flow.count)
                .ok_or_else(|| {
                    anyhow!(
                        "city '{name}' has fewer than {} residents of unit {:?} left to move",
                        flow.count,
                        flow.unit
                    )
                })?;
            *residents -= flow.count;
        }

        for flow in flows {
            let city = world
                .city_mut(flow.destination)
                .with_context(|| format!("flow enters unknown city {:?}", flow.destination))?;
            *city.residents.entry(flow.unit).or_insert(0) += flow.count;
        }

        let current = world.populations();
        let total_after: u64 = current.iter().sum();
        ensure!(
            total_before == total_after,
            "population not conserved: {total_before} before execution, {total_after} after"
        );

        ctx.set_population_change(PopulationChange { previous, current });
        Ok(())
    }
}
