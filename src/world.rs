use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::StructuralError;
use crate::factor::FactorDefinition;

macro_rules! index_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

index_id!(CityId);
index_id!(FactorId);
index_id!(UnitId);

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub position: Position,
    /// `None` means unbounded.
    pub capacity: Option<i64>,
    pub factors: BTreeMap<FactorId, f64>,
    pub(crate) residents: BTreeMap<UnitId, u64>,
}

impl City {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
            capacity: None,
            factors: BTreeMap::new(),
            residents: BTreeMap::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: i64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn with_factor(mut self, factor: FactorId, value: f64) -> Self {
        self.factors.insert(factor, value);
        self
    }

    pub fn population(&self) -> u64 {
        self.residents.values().sum()
    }

    pub fn residents_of(&self, unit: UnitId) -> u64 {
        self.residents.get(&unit).copied().unwrap_or(0)
    }

    pub fn residents(&self) -> impl Iterator<Item = (UnitId, u64)> + '_ {
        self.residents.iter().map(|(id, count)| (*id, *count))
    }

    pub fn factor(&self, factor: FactorId) -> Option<f64> {
        self.factors.get(&factor).copied()
    }

    /// Room left before capacity, negative when over capacity.
    pub fn remaining_capacity(&self) -> Option<i64> {
        self.capacity
            .map(|capacity| capacity - self.population().min(i64::MAX as u64) as i64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Individual,
    #[default]
    Group,
}

/// A migrating population: a single person or a group sharing one preference profile.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationUnit {
    pub name: String,
    pub kind: UnitKind,
    pub sensitivities: BTreeMap<FactorId, f64>,
    /// Upper bound on the share of members willing to move.
    pub moving_willingness: f64,
    /// Chance that a member stays put regardless of attraction.
    pub retention_rate: f64,
    pub attraction_threshold: f64,
    pub min_acceptable_attraction: f64,
    pub sensitivity_scaling: f64,
}

impl PopulationUnit {
    pub fn new(name: impl Into<String>, kind: UnitKind) -> Self {
        Self {
            name: name.into(),
            kind,
            sensitivities: BTreeMap::new(),
            moving_willingness: 0.5,
            retention_rate: 0.1,
            attraction_threshold: 0.0,
            min_acceptable_attraction: 0.0,
            sensitivity_scaling: 1.0,
        }
    }

    pub fn with_sensitivity(mut self, factor: FactorId, weight: f64) -> Self {
        self.sensitivities.insert(factor, weight);
        self
    }
}

/// A resident count of one unit in one city.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Residence {
    pub city: CityId,
    pub unit: UnitId,
    pub count: u64,
}

impl Residence {
    /// Stable identifier used to derive the residence's random stream.
    pub fn worker_id(&self) -> u64 {
        ((self.city.0 as u64) << 32) | (self.unit.0 as u64 & 0xFFFF_FFFF)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CitySnapshot {
    pub name: String,
    pub population: u64,
    pub capacity: Option<i64>,
    pub factors: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub total_population: u64,
    pub cities: Vec<CitySnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct World {
    factors: Vec<FactorDefinition>,
    cities: Vec<City>,
    units: Vec<PopulationUnit>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_factor(&mut self, factor: FactorDefinition) -> FactorId {
        self.factors.push(factor);
        FactorId(self.factors.len() - 1)
    }

    pub fn add_city(&mut self, city: City) -> CityId {
        self.cities.push(city);
        CityId(self.cities.len() - 1)
    }

    pub fn add_unit(&mut self, unit: PopulationUnit) -> UnitId {
        self.units.push(unit);
        UnitId(self.units.len() - 1)
    }

    /// Adds `count` members of `unit` to `city`.
    ///
    /// # Panics
    ///
    /// Panics if `city` was not created by this world.
    pub fn settle(&mut self, unit: UnitId, city: CityId, count: u64) {
        *self.cities[city.0].residents.entry(unit).or_insert(0) += count;
    }

    pub fn factors(&self) -> &[FactorDefinition] {
        &self.factors
    }

    pub fn factor(&self, id: FactorId) -> Option<&FactorDefinition> {
        self.factors.get(id.0)
    }

    pub fn factor_id(&self, name: &str) -> Option<FactorId> {
        self.factors.iter().position(|f| f.name == name).map(FactorId)
    }

    pub fn cities(&self) -> impl Iterator<Item = (CityId, &City)> + '_ {
        self.cities.iter().enumerate().map(|(i, c)| (CityId(i), c))
    }

    pub fn city_ids(&self) -> impl Iterator<Item = CityId> {
        (0..self.cities.len()).map(CityId)
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn city(&self, id: CityId) -> Option<&City> {
        self.cities.get(id.0)
    }

    pub fn city_mut(&mut self, id: CityId) -> Option<&mut City> {
        self.cities.get_mut(id.0)
    }

    pub fn city_id(&self, name: &str) -> Option<CityId> {
        self.cities.iter().position(|c| c.name == name).map(CityId)
    }

    pub fn unit(&self, id: UnitId) -> Option<&PopulationUnit> {
        self.units.get(id.0)
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &PopulationUnit)> + '_ {
        self.units.iter().enumerate().map(|(i, u)| (UnitId(i), u))
    }

    pub fn unit_id(&self, name: &str) -> Option<UnitId> {
        self.units.iter().position(|u| u.name == name).map(UnitId)
    }

    pub fn distance(&self, a: CityId, b: CityId) -> Option<f64> {
        Some(self.city(a)?.position.distance(&self.city(b)?.position))
    }

    pub fn total_population(&self) -> u64 {
        self.cities.iter().map(City::population).sum()
    }

    pub fn populations(&self) -> Vec<u64> {
        self.cities.iter().map(City::population).collect()
    }

    /// Every non-empty resident count, ordered by city then unit.
    pub fn residences(&self) -> Vec<Residence> {
        self.cities()
            .flat_map(|(city, c)| {
                c.residents()
                    .filter(|(_, count)| *count > 0)
                    .map(move |(unit, count)| Residence { city, unit, count })
            })
            .collect()
    }

    /// Factor definitions alongside mutable cities, for in-place factor updates.
    pub(crate) fn factors_and_cities_mut(&mut self) -> (&[FactorDefinition], &mut [City]) {
        (&self.factors, &mut self.cities)
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let cities = self
            .cities
            .iter()
            .map(|city| CitySnapshot {
                name: city.name.clone(),
                population: city.population(),
                capacity: city.capacity,
                factors: city
                    .factors
                    .iter()
                    .filter_map(|(id, value)| Some((self.factor(*id)?.name.clone(), *value)))
                    .collect(),
            })
            .collect();
        WorldSnapshot {
            total_population: self.total_population(),
            cities,
        }
    }

    /// Checks the structure the engine relies on before a run starts.
    pub fn validate(&self) -> Result<(), StructuralError> {
        if self.cities.is_empty() {
            return Err(StructuralError::NoCities);
        }

        let mut factor_names = HashSet::new();
        for factor in &self.factors {
            if !factor_names.insert(factor.name.as_str()) {
                return Err(StructuralError::DuplicateFactor(factor.name.clone()));
            }
            if !factor.has_valid_range() {
                return Err(StructuralError::InvalidFactorRange {
                    factor: factor.name.clone(),
                    min: factor.min,
                    max: factor.max,
                });
            }
        }

        let mut city_names = HashSet::new();
        for city in &self.cities {
            if !city_names.insert(city.name.as_str()) {
                return Err(StructuralError::DuplicateCity(city.name.clone()));
            }
            if let Some(capacity) = city.capacity.filter(|c| *c < 0) {
                return Err(StructuralError::NegativeCapacity {
                    city: city.name.clone(),
                    capacity,
                });
            }
            for id in city.factors.keys() {
                if self.factor(*id).is_none() {
                    return Err(StructuralError::UnknownFactor {
                        owner: format!("city '{}'", city.name),
                        factor: format!("#{}", id.0),
                    });
                }
            }
            for (index, factor) in self.factors.iter().enumerate() {
                if factor.required && !city.factors.contains_key(&FactorId(index)) {
                    return Err(StructuralError::MissingRequiredFactor {
                        city: city.name.clone(),
                        factor: factor.name.clone(),
                    });
                }
            }
            for unit in city.residents.keys() {
                if self.unit(*unit).is_none() {
                    return Err(StructuralError::UnknownUnit {
                        city: city.name.clone(),
                        unit: unit.0,
                    });
                }
            }
        }

        for (id, unit) in self.units() {
            for factor in unit.sensitivities.keys() {
                if self.factor(*factor).is_none() {
                    return Err(StructuralError::UnknownFactor {
                        owner: format!("unit '{}'", unit.name),
                        factor: format!("#{}", factor.0),
                    });
                }
            }
            let bounded = [
                ("moving_willingness", unit.moving_willingness),
                ("retention_rate", unit.retention_rate),
            ];
            for (field, value) in bounded {
                if !(0.0..=1.0).contains(&value) {
                    return Err(StructuralError::UnitParameterOutOfRange {
                        unit: unit.name.clone(),
                        field,
                        value,
                    });
                }
            }
            if unit.kind == UnitKind::Individual {
                let count: u64 = self.cities.iter().map(|c| c.residents_of(id)).sum();
                if count != 1 {
                    return Err(StructuralError::IndividualCount {
                        unit: unit.name.clone(),
                        count,
                    });
                }
            }
        }

        Ok(())
    }
}
