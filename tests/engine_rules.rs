use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use citymig::{
    config::{DecisionMode, SimulationConfig},
    engine::{EndReason, EngineBuilder, TickReport},
    error::{ConfigError, SimulationError, StructuralError},
    factor::{Direction, FactorDefinition},
    models::FeedbackRule,
    observer::SimulationObserver,
    world::{City, CityId, FactorId, Position, PopulationUnit, UnitId, UnitKind, World},
};

#[derive(Clone, Default)]
struct Reports(Arc<Mutex<Vec<TickReport>>>);

impl Reports {
    fn take(&self) -> Vec<TickReport> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl SimulationObserver for Reports {
    fn on_tick_complete(&mut self, report: &TickReport, _world: &World) {
        self.0.lock().unwrap().push(report.clone());
    }
}

struct Pair {
    world: World,
    a: CityId,
    b: CityId,
    jobs: FactorId,
}

fn pair(b_capacity: Option<i64>, a_jobs: f64, b_jobs: f64) -> Pair {
    let mut world = World::new();
    let jobs = world
        .add_factor(FactorDefinition::new("jobs", Direction::Positive, 0.0, 1.0).required());
    let a = world.add_city(City::new("A", Position::new(0.0, 0.0)).with_factor(jobs, a_jobs));
    let mut city_b = City::new("B", Position::new(1.0, 0.0)).with_factor(jobs, b_jobs);
    city_b.capacity = b_capacity;
    let b = world.add_city(city_b);
    Pair { world, a, b, jobs }
}

fn group(world: &mut World, jobs: FactorId) -> UnitId {
    let mut unit = PopulationUnit::new("workers", UnitKind::Group).with_sensitivity(jobs, 1.0);
    unit.moving_willingness = 0.5;
    unit.retention_rate = 0.1;
    world.add_unit(unit)
}

fn config(seed: u64) -> SimulationConfig {
    SimulationConfig {
        random_seed: Some(seed),
        max_ticks: 10,
        check_stability: false,
        min_ticks_before_stability_check: 0,
        ..SimulationConfig::default()
    }
}

#[test]
fn full_destination_receives_nobody() {
    let Pair { mut world, a, b, jobs } = pair(Some(100), 0.1, 0.9);
    let unit = group(&mut world, jobs);
    world.settle(unit, a, 1_000);
    world.settle(unit, b, 100);

    let reports = Reports::default();
    let mut engine = EngineBuilder::new(SimulationConfig { max_ticks: 1, ..config(5) })
        .with_observer(reports.clone())
        .build()
        .unwrap();
    engine.run(&mut world).unwrap();

    for report in reports.take() {
        assert!(
            report.flows.iter().all(|f| f.destination != b || f.count == 0),
            "tick {} moved people into a full city",
            report.tick
        );
    }
    assert!(world.city(b).unwrap().population() <= 100);
    assert_eq!(world.total_population(), 1_100);
}

#[test]
fn identical_cities_stabilize_once_checks_begin() {
    let Pair { mut world, a, b, jobs } = pair(None, 0.5, 0.5);
    let unit = group(&mut world, jobs);
    world.settle(unit, a, 300);
    world.settle(unit, b, 300);

    let cfg = SimulationConfig {
        check_stability: true,
        min_ticks_before_stability_check: 5,
        stability_check_interval: 1,
        max_ticks: 50,
        ..config(9)
    };
    let summary = EngineBuilder::new(cfg)
        .build()
        .unwrap()
        .run(&mut world)
        .unwrap();
    assert_eq!(summary.reason, EndReason::Stabilized);
    assert_eq!(summary.ticks, 5);
    assert_eq!(world.populations(), vec![300, 300]);
}

#[test]
fn max_ticks_ends_an_unstable_run() {
    let Pair { mut world, a, jobs, .. } = pair(None, 0.1, 0.9);
    let unit = group(&mut world, jobs);
    world.settle(unit, a, 5_000);

    let summary = EngineBuilder::new(SimulationConfig { max_ticks: 3, ..config(1) })
        .build()
        .unwrap()
        .run(&mut world)
        .unwrap();
    assert_eq!(summary.reason, EndReason::MaxTicksReached);
    assert_eq!(summary.ticks, 3);
}

#[test]
fn individuals_move_one_at_a_time_in_per_unit_mode() {
    let Pair { mut world, a, b, jobs } = pair(None, 0.1, 0.9);
    for i in 0..20 {
        let mut person = PopulationUnit::new(format!("person-{i}"), UnitKind::Individual)
            .with_sensitivity(jobs, 1.0);
        person.moving_willingness = 0.5;
        person.retention_rate = 0.1;
        let id = world.add_unit(person);
        world.settle(id, a, 1);
    }

    let reports = Reports::default();
    let cfg = SimulationConfig {
        decision_mode: DecisionMode::PerUnit,
        max_ticks: 30,
        ..config(11)
    };
    let mut engine = EngineBuilder::new(cfg)
        .with_observer(reports.clone())
        .build()
        .unwrap();
    engine.run(&mut world).unwrap();

    let reports = reports.take();
    assert!(reports.iter().flat_map(|r| &r.flows).all(|f| f.count == 1));
    assert_eq!(world.total_population(), 20);
    assert!(world.city(b).unwrap().population() > 0);
    // Every individual still lives in exactly one city.
    assert_eq!(world.validate(), Ok(()));
}

#[test]
fn per_capita_feedback_follows_arrivals() {
    let Pair { mut world, a, b, jobs } = pair(None, 0.1, 0.9);
    let housing = world.add_factor(FactorDefinition::new("housing", Direction::Positive, 0.0, 2.0));
    world.city_mut(b).unwrap().factors.insert(housing, 1.0);
    let unit = group(&mut world, jobs);
    world.settle(unit, a, 1_000);
    world.settle(unit, b, 100);

    let cfg = SimulationConfig {
        max_ticks: 1,
        feedback_smoothing_factor: 1.0,
        feedback_rules: BTreeMap::from([("housing".to_string(), FeedbackRule::PerCapitaResource)]),
        ..config(3)
    };
    EngineBuilder::new(cfg)
        .build()
        .unwrap()
        .run(&mut world)
        .unwrap();

    let city = world.city(b).unwrap();
    let grown = city.population() as f64;
    assert!(grown > 100.0);
    let expected = 100.0 / grown;
    assert!((city.factor(housing).unwrap() - expected).abs() < 1e-9);
    // Jobs has no rule and keeps its value.
    assert_eq!(city.factor(jobs), Some(0.9));
}

#[test]
fn sparse_feedback_sees_the_change_since_its_last_run() {
    let Pair { mut world, a, b, jobs } = pair(None, 0.1, 0.9);
    let housing = world.add_factor(FactorDefinition::new("housing", Direction::Positive, 0.0, 2.0));
    world.city_mut(b).unwrap().factors.insert(housing, 1.0);
    let unit = group(&mut world, jobs);
    world.settle(unit, a, 10_000);
    world.settle(unit, b, 100);

    let reports = Reports::default();
    let cfg = SimulationConfig {
        max_ticks: 2,
        feedback_interval: 2,
        feedback_smoothing_factor: 1.0,
        feedback_rules: BTreeMap::from([("housing".to_string(), FeedbackRule::PerCapitaResource)]),
        ..config(4)
    };
    let mut engine = EngineBuilder::new(cfg)
        .with_observer(reports.clone())
        .build()
        .unwrap();
    engine.run(&mut world).unwrap();

    let reports = reports.take();
    assert_eq!(reports[0].skipped_stages, vec!["feedback"]);
    assert!(reports[1].skipped_stages.is_empty());
    assert!(reports.iter().all(|r| r.migrants > 0));

    // Both ticks of growth count, not only the second one.
    let city = world.city(b).unwrap();
    let expected = 100.0 / city.population() as f64;
    assert!((city.factor(housing).unwrap() - expected).abs() < 1e-9);
}

#[test]
fn invalid_configuration_lists_every_violation() {
    let cfg = SimulationConfig {
        attraction_steepness: 0.0,
        feedback_smoothing_factor: 1.5,
        max_ticks: 0,
        ..SimulationConfig::default()
    };
    let Err(ConfigError::Invalid(report)) = EngineBuilder::new(cfg).build() else {
        panic!("invalid configuration was accepted");
    };
    assert!(report.has_violation("attraction_steepness"));
    assert!(report.has_violation("feedback_smoothing_factor"));
    assert!(report.has_violation("max_ticks"));
}

#[test]
fn missing_required_factor_stops_the_run_before_tick_one() {
    let Pair { mut world, a, jobs, .. } = pair(None, 0.1, 0.9);
    let unit = group(&mut world, jobs);
    world.settle(unit, a, 10);
    world.add_city(City::new("C", Position::new(5.0, 5.0)));

    let mut engine = EngineBuilder::new(config(2)).build().unwrap();
    let err = engine.run(&mut world).unwrap_err();
    assert!(matches!(
        err,
        SimulationError::Structure(StructuralError::MissingRequiredFactor { .. })
    ));
    assert_eq!(engine.current_tick(), 0);
    assert_eq!(world.total_population(), 10);
}
