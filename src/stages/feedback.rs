use anyhow::{ensure, Context, Result};

use crate::{
    engine::TickContext,
    models::FeedbackModel,
    stages::Stage,
    world::World,
};

/// Adjusts factor intensities to the population change since the last feedback run.
pub struct FeedbackStage {
    model: Box<dyn FeedbackModel>,
    interval: u64,
    /// Per-city populations when feedback last ran, or at run start.
    baseline: Option<Vec<u64>>,
}

impl FeedbackStage {
    /// Runs on ticks divisible by `interval`.
    pub fn new(model: Box<dyn FeedbackModel>, interval: u64) -> Self {
        Self {
            model,
            interval: interval.max(1),
            baseline: None,
        }
    }
}

impl Stage for FeedbackStage {
    fn name(&self) -> &'static str {
        "feedback"
    }

    fn prepare(&mut self, world: &World) -> Result<()> {
        self.baseline = Some(world.populations());
        Ok(())
    }

    fn should_execute(&self, ctx: &TickContext) -> bool {
        ctx.tick % self.interval == 0
    }

    fn run(&mut self, ctx: &mut TickContext, world: &mut World) -> Result<()> {
        let current = ctx.population_change()?.current.clone();
        let previous = self
            .baseline
            .take()
            .context("feedback ran before the stage was prepared")?;
        let (factors, cities) = world.factors_and_cities_mut();
        ensure!(
            previous.len() == cities.len() && current.len() == cities.len(),
            "population baseline covers {} cities, world has {}",
            previous.len(),
            cities.len()
        );
        for (index, city) in cities.iter_mut().enumerate() {
            self.model
                .apply(city, factors, previous[index], current[index]);
        }
        self.baseline = Some(current);
        Ok(())
    }
}
