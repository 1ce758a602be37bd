use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    engine::TickContext,
    models::{scale_to_capacity, MigrationFlow, MigrationModel},
    rng::RngStream,
    stages::Stage,
    world::World,
};

/// Turns attraction into flows, then caps inflows at destination capacity.
///
/// Every residence draws from its own generator, seeded from the run seed, the
/// residence and the tick, so the flow set does not depend on thread scheduling.
pub struct DecisionStage {
    model: Box<dyn MigrationModel>,
}

impl DecisionStage {
    pub fn new(model: Box<dyn MigrationModel>) -> Self {
        Self { model }
    }
}

impl Stage for DecisionStage {
    fn name(&self) -> &'static str {
        "decision"
    }

    fn run(&mut self, ctx: &mut TickContext, world: &mut World) -> Result<()> {
        let world: &World = world;
        let model = self.model.as_ref();
        let rng = ctx.rng;
        let tick = ctx.tick;

        let decided: Vec<Vec<MigrationFlow>> = ctx
            .attraction()?
            .par_iter()
            .map(|attraction| -> Result<Vec<MigrationFlow>> {
                let residence = attraction.residence;
                let unit = world
                    .unit(residence.unit)
                    .with_context(|| format!("no unit {:?}", residence.unit))?;
                let mut worker_rng =
                    rng.worker_rng(RngStream::Decision, residence.worker_id(), tick);
                Ok(model.decide(world, unit, attraction, &mut worker_rng))
            })
            .collect::<Result<_>>()?;

        let flows: Vec<MigrationFlow> = decided.into_iter().flatten().collect();
        let requested: u64 = flows.iter().map(|f| f.count).sum();
        let flows = scale_to_capacity(world, flows);
        let granted: u64 = flows.iter().map(|f| f.count).sum();
        debug!(
            tick,
            model = model.name(),
            requested,
            granted,
            flows = flows.len(),
            "migration decided"
        );
        ctx.set_flows(flows);
        Ok(())
    }
}
