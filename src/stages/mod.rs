mod attraction;
mod decision;
mod execution;
mod feedback;

use anyhow::Result;

use crate::engine::TickContext;
use crate::world::World;

pub use attraction::AttractionStage;
pub use decision::DecisionStage;
pub use execution::ExecutionStage;
pub use feedback::FeedbackStage;

/// One step of the per-tick pipeline.
pub trait Stage: Send {
    fn name(&self) -> &'static str;

    /// Called once before the first tick, after the world passed validation.
    fn prepare(&mut self, _world: &World) -> Result<()> {
        Ok(())
    }

    /// Lets a stage sit out a tick.
    fn should_execute(&self, _ctx: &TickContext) -> bool {
        true
    }

    fn run(&mut self, ctx: &mut TickContext, world: &mut World) -> Result<()>;
}
