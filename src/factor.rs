use serde::{Deserialize, Serialize};

use crate::math::logistic;

/// Whether a high raw value pulls people in or pushes them away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    Linear,
    Log,
    Sigmoid,
}

/// Slope of the sigmoid transform over the full factor range.
const SIGMOID_SPAN_STEEPNESS: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDefinition {
    pub name: String,
    pub direction: Direction,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub normalization: Normalization,
    /// Every city must carry a value for a required factor.
    #[serde(default)]
    pub required: bool,
}

impl FactorDefinition {
    pub fn new(name: impl Into<String>, direction: Direction, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            direction,
            min,
            max,
            normalization: Normalization::Linear,
            required: false,
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn has_valid_range(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max > self.min
    }

    pub fn clamp(&self, raw: f64) -> f64 {
        raw.clamp(self.min, self.max)
    }

    /// Maps a raw intensity into `[0, 1]`, monotonically non-decreasing in `raw`.
    pub fn normalize(&self, raw: f64) -> f64 {
        if !self.has_valid_range() || raw.is_nan() {
            return 0.0;
        }
        let span = self.max - self.min;
        let offset = self.clamp(raw) - self.min;
        let value = match self.normalization {
            Normalization::Linear => offset / span,
            Normalization::Log => offset.ln_1p() / span.ln_1p(),
            Normalization::Sigmoid => {
                let steepness = SIGMOID_SPAN_STEEPNESS / span;
                let midpoint = span / 2.0;
                let low = logistic(0.0, steepness, midpoint);
                let high = logistic(span, steepness, midpoint);
                (logistic(offset, steepness, midpoint) - low) / (high - low)
            }
        };
        value.clamp(0.0, 1.0)
    }

    /// Contribution of a normalized value to attraction: pull factors count as-is,
    /// push factors count their complement.
    pub fn oriented(&self, normalized: f64) -> f64 {
        match self.direction {
            Direction::Positive => normalized,
            Direction::Negative => 1.0 - normalized,
        }
    }
}
