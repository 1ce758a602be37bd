use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::{
    config::SimulationConfig,
    factor::FactorDefinition,
    world::{City, Position, PopulationUnit, UnitKind, World},
};

fn default_willingness() -> f64 {
    0.5
}

fn default_retention() -> f64 {
    0.1
}

fn default_scaling() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub config: SimulationConfig,
    /// Ticks between JSON snapshots; 0 disables them.
    #[serde(default)]
    pub snapshot_interval_ticks: u64,
    #[serde(default)]
    pub factors: Vec<FactorDefinition>,
    pub cities: Vec<ScenarioCity>,
    #[serde(default)]
    pub units: Vec<ScenarioUnit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioCity {
    pub name: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub capacity: Option<i64>,
    /// Raw intensity per factor name.
    #[serde(default)]
    pub factors: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioUnit {
    pub name: String,
    #[serde(default)]
    pub kind: UnitKind,
    #[serde(default = "default_willingness")]
    pub moving_willingness: f64,
    #[serde(default = "default_retention")]
    pub retention_rate: f64,
    #[serde(default)]
    pub attraction_threshold: f64,
    #[serde(default)]
    pub min_acceptable_attraction: f64,
    #[serde(default = "default_scaling")]
    pub sensitivity_scaling: f64,
    /// Weight per factor name.
    #[serde(default)]
    pub sensitivities: BTreeMap<String, f64>,
    /// Member count per city name.
    #[serde(default)]
    pub residences: BTreeMap<String, u64>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// Resolves names into ids. Structural checks are left to [`World::validate`].
    pub fn build_world(&self) -> Result<World> {
        let mut world = World::new();
        for factor in &self.factors {
            world.add_factor(factor.clone());
        }

        for city in &self.cities {
            let mut built = City::new(city.name.clone(), city.position);
            built.capacity = city.capacity;
            for (factor, value) in &city.factors {
                let Some(id) = world.factor_id(factor) else {
                    bail!("city '{}' sets unknown factor '{factor}'", city.name);
                };
                built.factors.insert(id, *value);
            }
            world.add_city(built);
        }

        for unit in &self.units {
            let mut built = PopulationUnit::new(unit.name.clone(), unit.kind);
            built.moving_willingness = unit.moving_willingness;
            built.retention_rate = unit.retention_rate;
            built.attraction_threshold = unit.attraction_threshold;
            built.min_acceptable_attraction = unit.min_acceptable_attraction;
            built.sensitivity_scaling = unit.sensitivity_scaling;
            for (factor, weight) in &unit.sensitivities {
                let Some(id) = world.factor_id(factor) else {
                    bail!("unit '{}' is sensitive to unknown factor '{factor}'", unit.name);
                };
                built.sensitivities.insert(id, *weight);
            }
            let unit_id = world.add_unit(built);
            for (city, count) in &unit.residences {
                let Some(city_id) = world.city_id(city) else {
                    bail!("unit '{}' resides in unknown city '{city}'", unit.name);
                };
                world.settle(unit_id, city_id, *count);
            }
        }

        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
name: pair
config:
  max_ticks: 20
  random_seed: 3
factors:
  - name: jobs
    direction: positive
    min: 0
    max: 1
    required: true
  - name: rent
    direction: negative
    min: 0
    max: 3000
    normalization: log
cities:
  - name: Old Town
    position: { x: 0, y: 0 }
    factors: { jobs: 0.2, rent: 800 }
  - name: New Town
    position: { x: 4, y: 3 }
    capacity: 900
    factors: { jobs: 0.8, rent: 1500 }
units:
  - name: families
    sensitivities: { jobs: 2.0, rent: 1.0 }
    residences: { Old Town: 700, New Town: 200 }
"#;

    #[test]
    fn builds_world_from_names() {
        let scenario: Scenario = serde_yaml::from_str(YAML).unwrap();
        assert_eq!(scenario.config.max_ticks, 20);
        let world = scenario.build_world().unwrap();
        assert_eq!(world.city_count(), 2);
        assert_eq!(world.total_population(), 900);
        let new_town = world.city_id("New Town").unwrap();
        assert_eq!(world.city(new_town).unwrap().capacity, Some(900));
        let unit = world.unit(world.unit_id("families").unwrap()).unwrap();
        assert_eq!(unit.moving_willingness, 0.5);
        assert_eq!(unit.sensitivities.len(), 2);
        assert_eq!(world.validate(), Ok(()));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let broken = YAML.replace("Old Town: 700", "Atlantis: 700");
        let scenario: Scenario = serde_yaml::from_str(&broken).unwrap();
        let err = scenario.build_world().unwrap_err();
        assert!(err.to_string().contains("Atlantis"));
    }
}
