//! How appealing a city is to a population unit.

use serde::Serialize;

use crate::config::SimulationConfig;
use crate::math::logistic;
use crate::world::{CityId, PopulationUnit, World};

/// Attraction of one city for one unit on the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttractionResult {
    pub city: CityId,
    /// Squashed factor score in `[0, 1]`.
    pub base: f64,
    pub capacity_resistance: f64,
    pub distance_resistance: f64,
}

impl AttractionResult {
    pub fn adjusted(&self) -> f64 {
        self.base * (1.0 - self.capacity_resistance) * self.distance_resistance
    }
}

/// Scores cities for units. Implementations must be pure for a given world state.
pub trait AttractionModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Attraction of `city` for `unit`. `origin` supplies relocation context for
    /// distance decay; without it the distance resistance is 1.
    fn compute(
        &self,
        world: &World,
        city: CityId,
        unit: &PopulationUnit,
        origin: Option<CityId>,
    ) -> AttractionResult;
}

/// Logistic squash of weighted factor scores, damped by crowding and distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticAttraction {
    pub steepness: f64,
    pub capacity_steepness: f64,
    pub distance_decay_lambda: f64,
}

impl LogisticAttraction {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            steepness: config.attraction_steepness,
            capacity_steepness: config.capacity_steepness,
            distance_decay_lambda: config.distance_decay_lambda,
        }
    }

    fn base_score(&self, world: &World, city: CityId, unit: &PopulationUnit) -> f64 {
        let Some(city) = world.city(city) else {
            return 0.0;
        };
        let raw: f64 = unit
            .sensitivities
            .iter()
            .filter_map(|(factor_id, weight)| {
                let factor = world.factor(*factor_id)?;
                let intensity = city.factor(*factor_id)?;
                Some(weight * factor.oriented(factor.normalize(intensity)))
            })
            .sum();
        logistic(raw * unit.sensitivity_scaling, self.steepness, 0.0)
    }

    fn capacity_resistance(&self, world: &World, city: CityId) -> f64 {
        let Some(city) = world.city(city) else {
            return 0.0;
        };
        match city.capacity {
            None => 0.0,
            Some(capacity) if capacity <= 0 => 1.0,
            Some(capacity) => {
                let load = city.population() as f64 / capacity as f64;
                logistic(load, self.capacity_steepness, 1.0)
            }
        }
    }

    fn distance_resistance(&self, world: &World, city: CityId, origin: Option<CityId>) -> f64 {
        origin
            .and_then(|origin| world.distance(origin, city))
            .map_or(1.0, |distance| (-self.distance_decay_lambda * distance).exp())
    }
}

impl AttractionModel for LogisticAttraction {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn compute(
        &self,
        world: &World,
        city: CityId,
        unit: &PopulationUnit,
        origin: Option<CityId>,
    ) -> AttractionResult {
        AttractionResult {
            city,
            base: self.base_score(world, city, unit),
            capacity_resistance: self.capacity_resistance(world, city),
            distance_resistance: self.distance_resistance(world, city, origin),
        }
    }
}
