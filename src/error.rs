use std::fmt;

use thiserror::Error;

/// A single rejected configuration value.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigViolation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of [`SimulationConfig::validate`](crate::config::SimulationConfig::validate).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    violations: Vec<ConfigViolation>,
}

impl ValidationReport {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.violations.push(ConfigViolation {
            field,
            message: message.into(),
        });
    }

    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[ConfigViolation] {
        &self.violations
    }

    pub fn has_violation(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }

    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self))
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.violations.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(ValidationReport),
}

/// Problems with the shape of a [`World`](crate::world::World) that stop a run
/// from starting.
#[derive(Debug, Error, PartialEq)]
pub enum StructuralError {
    #[error("world has no cities")]
    NoCities,
    #[error("city name '{0}' is used more than once")]
    DuplicateCity(String),
    #[error("factor name '{0}' is defined more than once")]
    DuplicateFactor(String),
    #[error("city '{city}' has negative capacity {capacity}")]
    NegativeCapacity { city: String, capacity: i64 },
    #[error("factor '{factor}' has an empty or inverted range [{min}, {max}]")]
    InvalidFactorRange { factor: String, min: f64, max: f64 },
    #[error("city '{city}' is missing a value for required factor '{factor}'")]
    MissingRequiredFactor { city: String, factor: String },
    #[error("{owner} references unknown factor '{factor}'")]
    UnknownFactor { owner: String, factor: String },
    #[error("city '{city}' hosts unknown unit #{unit}")]
    UnknownUnit { city: String, unit: usize },
    #[error("unit '{unit}' has {field} = {value}, expected a value in [0, 1]")]
    UnitParameterOutOfRange {
        unit: String,
        field: &'static str,
        value: f64,
    },
    #[error("individual '{unit}' must reside in exactly one place, found a total count of {count}")]
    IndividualCount { unit: String, count: u64 },
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Structure(#[from] StructuralError),
    #[error("stage '{stage}' failed on tick {tick}: {source:#}")]
    Stage {
        tick: u64,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("simulation already finished ({0}); engines cannot be resumed")]
    AlreadyFinished(String),
}
