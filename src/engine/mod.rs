mod context;

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info};

use crate::{
    config::SimulationConfig,
    error::{ConfigError, SimulationError, StructuralError},
    models::{
        migration, AttractionModel, FeedbackModel, LogisticAttraction, MigrationFlow,
        MigrationModel, SmoothedFeedback,
    },
    observer::SimulationObserver,
    rng::RngManager,
    stages::{AttractionStage, DecisionStage, ExecutionStage, FeedbackStage, Stage},
    world::World,
};

pub use context::{PopulationChange, TickContext};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    Stabilized,
    MaxTicksReached,
    Errored,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EndReason::Stabilized => "Stabilized",
            EndReason::MaxTicksReached => "MaxTicksReached",
            EndReason::Errored => "Errored",
        };
        f.write_str(label)
    }
}

/// Lifecycle of an [`Engine`]. Terminal states never go back to `Running`.
///
/// A run passes through its end state before `Completed`; observers see every
/// transition through [`SimulationObserver::on_state_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    Stabilized,
    MaxTicksReached,
    Errored,
    Completed(EndReason),
}

impl RunState {
    fn ended(reason: EndReason) -> Self {
        match reason {
            EndReason::Stabilized => RunState::Stabilized,
            EndReason::MaxTicksReached => RunState::MaxTicksReached,
            EndReason::Errored => RunState::Errored,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StageRunReport {
    pub name: &'static str,
    pub duration_ms: f64,
}

/// What happened during one tick.
#[derive(Clone, Debug, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub flows: Vec<MigrationFlow>,
    pub migrants: u64,
    /// Sum over cities of the absolute population change.
    pub population_change: u64,
    pub stages: Vec<StageRunReport>,
    pub skipped_stages: Vec<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub reason: EndReason,
    pub ticks: u64,
    pub seed: u64,
    pub total_population: u64,
}

pub struct EngineBuilder {
    config: SimulationConfig,
    attraction: Option<Box<dyn AttractionModel>>,
    migration: Option<Box<dyn MigrationModel>>,
    feedback: Option<Box<dyn FeedbackModel>>,
    observers: Vec<Box<dyn SimulationObserver>>,
}

impl EngineBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            attraction: None,
            migration: None,
            feedback: None,
            observers: Vec::new(),
        }
    }

    pub fn with_attraction_model(mut self, model: impl AttractionModel + 'static) -> Self {
        self.attraction = Some(Box::new(model));
        self
    }

    /// Overrides the strategy selected by `decision_mode`.
    pub fn with_migration_model(mut self, model: impl MigrationModel + 'static) -> Self {
        self.migration = Some(Box::new(model));
        self
    }

    pub fn with_feedback_model(mut self, model: impl FeedbackModel + 'static) -> Self {
        self.feedback = Some(Box::new(model));
        self
    }

    pub fn with_observer(mut self, observer: impl SimulationObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn push_observer(&mut self, observer: impl SimulationObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Validates the configuration and assembles the fixed stage pipeline.
    pub fn build(self) -> Result<Engine, ConfigError> {
        self.config.validate().into_result()?;

        let config = self.config;
        let attraction = self
            .attraction
            .unwrap_or_else(|| Box::new(LogisticAttraction::from_config(&config)));
        let migration = self
            .migration
            .unwrap_or_else(|| migration::model_for(&config));
        let feedback = self
            .feedback
            .unwrap_or_else(|| Box::new(SmoothedFeedback::from_config(&config)));

        let rng = RngManager::from_optional_seed(config.random_seed);
        if config.random_seed.is_none() {
            info!(seed = rng.seed(), "no random_seed configured, generated one");
        }

        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(AttractionStage::new(attraction)),
            Box::new(DecisionStage::new(migration)),
            Box::new(ExecutionStage::new()),
            Box::new(FeedbackStage::new(feedback, config.feedback_interval)),
        ];

        Ok(Engine::assemble(config, rng, stages, self.observers))
    }
}

/// Drives the tick loop over a borrowed [`World`].
pub struct Engine {
    config: SimulationConfig,
    rng: RngManager,
    stages: Vec<Box<dyn Stage>>,
    observers: Vec<Box<dyn SimulationObserver>>,
    state: RunState,
    tick: u64,
}

impl Engine {
    fn assemble(
        config: SimulationConfig,
        rng: RngManager,
        stages: Vec<Box<dyn Stage>>,
        observers: Vec<Box<dyn SimulationObserver>>,
    ) -> Self {
        Self {
            config,
            rng,
            stages,
            observers,
            state: RunState::Created,
            tick: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Runs ticks until the world stabilizes, `max_ticks` is reached, or a stage fails.
    ///
    /// The world is validated first; a structurally broken world never starts.
    /// A stage failure leaves the world as it was when the failing stage stopped.
    pub fn run(&mut self, world: &mut World) -> Result<RunSummary, SimulationError> {
        if self.state != RunState::Created {
            return Err(SimulationError::AlreadyFinished(format!("{:?}", self.state)));
        }
        world.validate()?;
        self.check_feedback_rules(world)?;
        for stage in self.stages.iter_mut() {
            let name = stage.name();
            stage
                .prepare(world)
                .map_err(|source| SimulationError::Stage {
                    tick: 0,
                    stage: name,
                    source,
                })?;
        }

        self.transition(RunState::Running);
        info!(
            seed = self.rng.seed(),
            cities = world.city_count(),
            population = world.total_population(),
            max_ticks = self.config.max_ticks,
            "simulation starting"
        );
        for observer in self.observers.iter_mut() {
            observer.on_simulation_start(world, self.rng.seed());
        }

        loop {
            let tick = self.tick + 1;
            self.tick = tick;

            let report = match self.run_tick(world, tick) {
                Ok(report) => report,
                Err(err) => {
                    error!(tick, error = %err, "simulation aborted");
                    self.transition(RunState::Errored);
                    for observer in self.observers.iter_mut() {
                        observer.on_error(&err);
                    }
                    self.finish(EndReason::Errored, world);
                    return Err(err);
                }
            };

            for observer in self.observers.iter_mut() {
                observer.on_tick_complete(&report, world);
            }

            if self.config.stability_check_due(tick)
                && report.population_change as f64 <= self.config.stability_threshold
            {
                return Ok(self.finish(EndReason::Stabilized, world));
            }
            if tick >= self.config.max_ticks {
                return Ok(self.finish(EndReason::MaxTicksReached, world));
            }
        }
    }

    fn run_tick(&mut self, world: &mut World, tick: u64) -> Result<TickReport, SimulationError> {
        for observer in self.observers.iter_mut() {
            observer.on_tick_start(tick);
        }

        let mut ctx = TickContext::new(tick, self.rng);
        let mut stages = Vec::with_capacity(self.stages.len());
        let mut skipped_stages = Vec::new();

        for stage in self.stages.iter_mut() {
            let name = stage.name();
            if !stage.should_execute(&ctx) {
                skipped_stages.push(name);
                continue;
            }
            let start = Instant::now();
            stage
                .run(&mut ctx, world)
                .map_err(|source| SimulationError::Stage {
                    tick,
                    stage: name,
                    source,
                })?;
            stages.push(StageRunReport {
                name,
                duration_ms: start.elapsed().as_secs_f64() * 1_000.0,
            });
            for observer in self.observers.iter_mut() {
                observer.on_stage_complete(tick, name);
            }
        }

        let population_change = ctx
            .population_change()
            .map(PopulationChange::total_absolute_change)
            .unwrap_or(0);
        let flows = ctx.take_flows();
        let migrants = flows.iter().map(|flow| flow.count).sum();

        Ok(TickReport {
            tick,
            flows,
            migrants,
            population_change,
            stages,
            skipped_stages,
        })
    }

    fn finish(&mut self, reason: EndReason, world: &World) -> RunSummary {
        if self.state == RunState::Running {
            self.transition(RunState::ended(reason));
        }
        let summary = RunSummary {
            reason,
            ticks: self.tick,
            seed: self.rng.seed(),
            total_population: world.total_population(),
        };
        info!(
            reason = %reason,
            ticks = summary.ticks,
            population = summary.total_population,
            "simulation finished"
        );
        for observer in self.observers.iter_mut() {
            observer.on_simulation_end(&summary);
        }
        self.transition(RunState::Completed(reason));
        summary
    }

    fn transition(&mut self, next: RunState) {
        let previous = self.state;
        self.state = next;
        for observer in self.observers.iter_mut() {
            observer.on_state_change(previous, next);
        }
    }

    fn check_feedback_rules(&self, world: &World) -> Result<(), StructuralError> {
        for factor in self.config.feedback_rules.keys() {
            if world.factor_id(factor).is_none() {
                return Err(StructuralError::UnknownFactor {
                    owner: "feedback rule table".into(),
                    factor: factor.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::bail;

    use super::*;
    use crate::factor::{Direction, FactorDefinition};
    use crate::world::{City, Position, PopulationUnit, UnitKind};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl SimulationObserver for Recorder {
        fn on_simulation_start(&mut self, _world: &World, _seed: u64) {
            self.0.lock().unwrap().push("start".into());
        }
        fn on_tick_start(&mut self, tick: u64) {
            self.0.lock().unwrap().push(format!("tick {tick}"));
        }
        fn on_stage_complete(&mut self, _tick: u64, stage: &str) {
            self.0.lock().unwrap().push(stage.to_string());
        }
        fn on_simulation_end(&mut self, summary: &RunSummary) {
            self.0.lock().unwrap().push(format!("end {}", summary.reason));
        }
        fn on_error(&mut self, _error: &SimulationError) {
            self.0.lock().unwrap().push("error".into());
        }
    }

    struct FailingStage;

    impl Stage for FailingStage {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn run(&mut self, ctx: &mut TickContext, _world: &mut World) -> anyhow::Result<()> {
            if ctx.tick == 2 {
                bail!("boom");
            }
            Ok(())
        }
    }

    fn world() -> World {
        let mut world = World::new();
        let jobs = world.add_factor(FactorDefinition::new("jobs", Direction::Positive, 0.0, 1.0));
        let a = world.add_city(City::new("A", Position::default()).with_factor(jobs, 0.5));
        world.add_city(City::new("B", Position::new(1.0, 0.0)).with_factor(jobs, 0.5));
        let unit = world.add_unit(PopulationUnit::new("g", UnitKind::Group).with_sensitivity(jobs, 1.0));
        world.settle(unit, a, 10);
        world
    }

    fn config() -> SimulationConfig {
        SimulationConfig {
            random_seed: Some(1),
            max_ticks: 5,
            min_ticks_before_stability_check: 0,
            check_stability: false,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn stage_failure_is_reported_and_final() {
        let recorder = Recorder::default();
        let mut engine = Engine::assemble(
            config(),
            RngManager::new(1),
            vec![Box::new(FailingStage)],
            vec![Box::new(recorder.clone())],
        );
        let mut world = world();

        let err = engine.run(&mut world).unwrap_err();
        assert!(matches!(err, SimulationError::Stage { tick: 2, stage: "failing", .. }));
        assert_eq!(engine.state(), RunState::Completed(EndReason::Errored));
        assert_eq!(
            recorder.events(),
            vec!["start", "tick 1", "failing", "tick 2", "error", "end Errored"]
        );

        assert!(matches!(
            engine.run(&mut world),
            Err(SimulationError::AlreadyFinished(_))
        ));
    }

    #[derive(Clone, Default)]
    struct States(Arc<Mutex<Vec<RunState>>>);

    impl SimulationObserver for States {
        fn on_state_change(&mut self, _from: RunState, to: RunState) {
            self.0.lock().unwrap().push(to);
        }
    }

    #[test]
    fn end_states_are_visible_before_completion() {
        let states = States::default();
        let mut engine = EngineBuilder::new(SimulationConfig {
            max_ticks: 1,
            ..config()
        })
        .with_observer(states.clone())
        .build()
        .unwrap();
        engine.run(&mut world()).unwrap();
        assert_eq!(
            *states.0.lock().unwrap(),
            vec![
                RunState::Running,
                RunState::MaxTicksReached,
                RunState::Completed(EndReason::MaxTicksReached)
            ]
        );

        let failed = States::default();
        let mut engine = Engine::assemble(
            config(),
            RngManager::new(1),
            vec![Box::new(FailingStage)],
            vec![Box::new(failed.clone())],
        );
        engine.run(&mut world()).unwrap_err();
        assert_eq!(
            *failed.0.lock().unwrap(),
            vec![
                RunState::Running,
                RunState::Errored,
                RunState::Completed(EndReason::Errored)
            ]
        );
    }

    #[test]
    fn stages_run_in_order_and_report_end() {
        let recorder = Recorder::default();
        let mut engine = EngineBuilder::new(SimulationConfig {
            max_ticks: 1,
            ..config()
        })
        .with_observer(recorder.clone())
        .build()
        .unwrap();
        let summary = engine.run(&mut world()).unwrap();
        assert_eq!(summary.reason, EndReason::MaxTicksReached);
        assert_eq!(summary.ticks, 1);
        assert_eq!(
            recorder.events(),
            vec![
                "start",
                "tick 1",
                "attraction",
                "decision",
                "execution",
                "feedback",
                "end MaxTicksReached"
            ]
        );
    }

    #[test]
    fn invalid_config_never_builds() {
        let result = EngineBuilder::new(SimulationConfig {
            feedback_smoothing_factor: 2.0,
            ..config()
        })
        .build();
        match result {
            Err(ConfigError::Invalid(report)) => {
                assert!(report.has_violation("feedback_smoothing_factor"))
            }
            Ok(_) => panic!("invalid config must not build"),
        }
    }

    #[test]
    fn broken_world_never_starts() {
        let recorder = Recorder::default();
        let mut engine = EngineBuilder::new(config())
            .with_observer(recorder.clone())
            .build()
            .unwrap();
        let mut world = world();
        world.add_city(City::new("A", Position::default()));
        assert!(matches!(
            engine.run(&mut world),
            Err(SimulationError::Structure(StructuralError::DuplicateCity(_)))
        ));
        assert_eq!(engine.state(), RunState::Created);
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn unknown_feedback_rule_factor_is_structural() {
        let mut config = config();
        config
            .feedback_rules
            .insert("weather".into(), crate::models::FeedbackRule::None);
        let mut engine = EngineBuilder::new(config).build().unwrap();
        assert!(matches!(
            engine.run(&mut world()),
            Err(SimulationError::Structure(StructuralError::UnknownFactor { .. }))
        ));
    }
}
