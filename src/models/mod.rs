//! The three swappable models driving each tick.

pub mod attraction;
pub mod feedback;
pub mod migration;

pub use attraction::{AttractionModel, AttractionResult, LogisticAttraction};
pub use feedback::{FeedbackModel, FeedbackRule, SmoothedFeedback};
pub use migration::{
    scale_to_capacity, AggregateDecision, MigrationFlow, MigrationModel, PerUnitDecision,
    ResidenceAttraction,
};
