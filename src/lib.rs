pub mod config;
pub mod engine;
pub mod error;
pub mod factor;
pub mod math;
pub mod models;
pub mod observer;
pub mod rng;
pub mod sampling;
pub mod scenario;
pub mod snapshot;
pub mod stages;
pub mod world;

pub use config::{DecisionMode, SimulationConfig};
pub use engine::{EndReason, Engine, EngineBuilder, RunState, RunSummary, TickReport};
pub use error::{ConfigError, SimulationError, StructuralError};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{City, CityId, PopulationUnit, UnitKind, World};
