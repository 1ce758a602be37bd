//! Turning attraction differentials into migration flows.

use std::collections::BTreeMap;

use rand::Rng;
use serde::Serialize;

use crate::config::{DecisionMode, SimulationConfig};
use crate::math::{clamp_unit, logistic, sigmoid};
use crate::models::attraction::AttractionResult;
use crate::rng::WorkerRng;
use crate::sampling::sample_binomial;
use crate::world::{City, CityId, PopulationUnit, Residence, UnitId, World};

/// Migrants of one unit moving between two cities on one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationFlow {
    pub origin: CityId,
    pub destination: CityId,
    pub unit: UnitId,
    pub count: u64,
    pub probability: f64,
    pub differential: f64,
}

/// Attraction of the origin and of every other city, as seen by one residence.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidenceAttraction {
    pub residence: Residence,
    /// Scored without relocation context.
    pub origin: AttractionResult,
    /// Scored relative to the origin, ordered by city id.
    pub destinations: Vec<AttractionResult>,
}

pub trait MigrationModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Flows leaving one residence. Counts across the returned flows never exceed
    /// the residence's population.
    fn decide(
        &self,
        world: &World,
        unit: &PopulationUnit,
        attraction: &ResidenceAttraction,
        rng: &mut WorkerRng,
    ) -> Vec<MigrationFlow>;
}

pub fn model_for(config: &SimulationConfig) -> Box<dyn MigrationModel> {
    match config.decision_mode {
        DecisionMode::Aggregate => Box::new(AggregateDecision::from_config(config)),
        DecisionMode::PerUnit => Box::new(PerUnitDecision::from_config(config)),
    }
}

/// Each member weighs the single best destination and rolls retention, then migration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerUnitDecision {
    pub steepness: f64,
    pub midpoint: f64,
}

impl PerUnitDecision {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            steepness: config.migration_probability_steepness,
            midpoint: config.migration_probability_threshold,
        }
    }

    /// Destination with the highest willingness-weighted differential that clears
    /// both of the unit's thresholds. Ties keep the lower city id.
    pub fn best_destination(
        unit: &PopulationUnit,
        attraction: &ResidenceAttraction,
    ) -> Option<(CityId, f64)> {
        let origin_score = attraction.origin.adjusted();
        attraction
            .destinations
            .iter()
            .filter(|dest| dest.city != attraction.residence.city)
            .map(|dest| {
                let differential = (dest.adjusted() - origin_score) * unit.moving_willingness;
                (dest, differential)
            })
            .filter(|(dest, differential)| {
                *differential > unit.attraction_threshold
                    && dest.adjusted() > unit.min_acceptable_attraction
            })
            .fold(None, |best: Option<(CityId, f64)>, (dest, differential)| match best {
                Some((_, best_differential)) if best_differential >= differential => best,
                _ => Some((dest.city, differential)),
            })
    }
}

impl MigrationModel for PerUnitDecision {
    fn name(&self) -> &'static str {
        "per_unit"
    }

    fn decide(
        &self,
        _world: &World,
        unit: &PopulationUnit,
        attraction: &ResidenceAttraction,
        rng: &mut WorkerRng,
    ) -> Vec<MigrationFlow> {
        let residence = attraction.residence;
        let Some((destination, differential)) = Self::best_destination(unit, attraction) else {
            return Vec::new();
        };
        let probability = clamp_unit(logistic(differential, self.steepness, self.midpoint));

        let movers = (0..residence.count)
            .filter(|_| {
                if rng.gen::<f64>() < unit.retention_rate {
                    return false;
                }
                rng.gen::<f64>() <= probability
            })
            .count() as u64;

        if movers == 0 {
            return Vec::new();
        }
        vec![MigrationFlow {
            origin: residence.city,
            destination,
            unit: residence.unit,
            count: movers,
            probability,
            differential,
        }]
    }
}

/// Binomially sampled flows from a group to every eligible destination, with a
/// logistic pull discounted by travel cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateDecision {
    pub steepness: f64,
    pub cost_sensitivity: f64,
    pub base_cost: f64,
}

struct Candidate {
    destination: CityId,
    differential: f64,
    probability: f64,
}

impl AggregateDecision {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            steepness: config.migration_probability_steepness,
            cost_sensitivity: config.cost_sensitivity,
            base_cost: config.base_migration_cost,
        }
    }

    /// Retention-adjusted probability of moving to a destination at `distance`.
    pub fn effective_probability(
        &self,
        unit: &PopulationUnit,
        differential: f64,
        distance: f64,
    ) -> f64 {
        let pull = sigmoid(self.steepness * differential);
        let cost = (-self.cost_sensitivity * self.base_cost * distance).exp();
        clamp_unit((1.0 - unit.retention_rate) * pull * cost)
    }

    fn candidates(
        &self,
        world: &World,
        unit: &PopulationUnit,
        attraction: &ResidenceAttraction,
    ) -> Vec<Candidate> {
        let origin = attraction.residence.city;
        let origin_score = attraction.origin.adjusted();
        let mut candidates: Vec<Candidate> = attraction
            .destinations
            .iter()
            .filter(|dest| dest.city != origin)
            .filter_map(|dest| {
                let differential = dest.adjusted() - origin_score;
                if differential <= unit.attraction_threshold
                    || dest.adjusted() <= unit.min_acceptable_attraction
                {
                    return None;
                }
                let distance = world.distance(origin, dest.city)?;
                Some(Candidate {
                    destination: dest.city,
                    differential,
                    probability: self.effective_probability(unit, differential, distance),
                })
            })
            .collect();
        // Stable sort keeps city order among equal probabilities.
        candidates.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        candidates
    }
}

impl MigrationModel for AggregateDecision {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn decide(
        &self,
        world: &World,
        unit: &PopulationUnit,
        attraction: &ResidenceAttraction,
        rng: &mut WorkerRng,
    ) -> Vec<MigrationFlow> {
        let residence = attraction.residence;
        let group_size = residence.count;
        let mut unallocated = group_size;
        let mut flows = Vec::new();

        for candidate in self.candidates(world, unit, attraction) {
            if unallocated == 0 {
                break;
            }
            // Expected migrants: group_size * willingness * effective probability.
            let per_member = clamp_unit(unit.moving_willingness * candidate.probability);
            let count = sample_binomial(rng, group_size, per_member).min(unallocated);
            unallocated -= count;
            if count > 0 {
                flows.push(MigrationFlow {
                    origin: residence.city,
                    destination: candidate.destination,
                    unit: residence.unit,
                    count,
                    probability: candidate.probability,
                    differential: candidate.differential,
                });
            }
        }
        flows
    }
}

/// Scales inflows down so no capped destination is pushed past its capacity.
///
/// Flows into an over-subscribed destination are multiplied by
/// `remaining / inflow` and floored; flows that floor to zero are dropped.
/// `remaining` is measured against the populations in `world`, which must be the
/// pre-execution state.
pub fn scale_to_capacity(world: &World, flows: Vec<MigrationFlow>) -> Vec<MigrationFlow> {
    let mut inflow: BTreeMap<CityId, u64> = BTreeMap::new();
    for flow in &flows {
        *inflow.entry(flow.destination).or_insert(0) += flow.count;
    }

    flows
        .into_iter()
        .filter_map(|mut flow| {
            let remaining = world
                .city(flow.destination)
                .and_then(City::remaining_capacity);
            if let Some(remaining) = remaining {
                let total = inflow.get(&flow.destination).copied().unwrap_or(0);
                let room = remaining.max(0) as u64;
                if total > room {
                    flow.count = (flow.count as u128 * room as u128 / total as u128) as u64;
                }
            }
            (flow.count > 0).then_some(flow)
        })
        .collect()
}
