//! Post-migration adjustment of city factor intensities.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::factor::FactorDefinition;
use crate::world::City;

/// How a factor reacts to a change in its city's population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FeedbackRule {
    /// A fixed resource shared among more (or fewer) people.
    PerCapitaResource,
    /// Prices move with relative population growth.
    PriceCost { elasticity: f64 },
    /// Congestion-style cost growing linearly with new residents.
    NegativeExternality { coefficient: f64 },
    /// Agglomeration benefit from growth that fades as the city saturates.
    PositiveExternality { saturation_point: f64 },
    None,
}

impl FeedbackRule {
    pub(crate) fn check(&self) -> Result<(), String> {
        match *self {
            FeedbackRule::PriceCost { elasticity } if !elasticity.is_finite() => {
                Err(format!("elasticity must be finite, got {elasticity}"))
            }
            FeedbackRule::NegativeExternality { coefficient } if !coefficient.is_finite() => {
                Err(format!("coefficient must be finite, got {coefficient}"))
            }
            FeedbackRule::PositiveExternality { saturation_point }
                if !(saturation_point.is_finite() && saturation_point > 0.0) =>
            {
                Err(format!(
                    "saturation_point must be positive, got {saturation_point}"
                ))
            }
            _ => Ok(()),
        }
    }

    /// Value the factor is pulled towards, or `None` when the rule leaves it alone.
    pub fn target(&self, current: f64, previous_pop: u64, current_pop: u64) -> Option<f64> {
        if previous_pop == 0 {
            return None;
        }
        let prev = previous_pop as f64;
        let now = current_pop as f64;
        let delta = now - prev;
        match *self {
            FeedbackRule::PerCapitaResource => {
                if current_pop == 0 {
                    return None;
                }
                Some(current / (now / prev))
            }
            FeedbackRule::PriceCost { elasticity } => {
                Some(current + elasticity * (delta / prev) * current)
            }
            FeedbackRule::NegativeExternality { coefficient } => Some(current + coefficient * delta),
            FeedbackRule::PositiveExternality { saturation_point } => {
                if delta <= 0.0 {
                    return None;
                }
                let damping = 1.0 - (now / saturation_point).tanh();
                Some(current * (1.0 + (delta / now) * damping))
            }
            FeedbackRule::None => None,
        }
    }
}

/// Moves `current` a `smoothing` share of the way to `target`.
pub fn smooth(current: f64, target: f64, smoothing: f64) -> f64 {
    current + smoothing * (target - current)
}

pub trait FeedbackModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Updates `city`'s factor intensities after its population went from
    /// `previous_pop` to `current_pop`. Does nothing when `previous_pop` is zero.
    fn apply(
        &self,
        city: &mut City,
        factors: &[FactorDefinition],
        previous_pop: u64,
        current_pop: u64,
    );
}

/// Rule table keyed by factor name with exponential smoothing towards each target.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedFeedback {
    pub rules: BTreeMap<String, FeedbackRule>,
    pub smoothing: f64,
}

impl SmoothedFeedback {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            rules: config.feedback_rules.clone(),
            smoothing: config.feedback_smoothing_factor,
        }
    }
}

impl FeedbackModel for SmoothedFeedback {
    fn name(&self) -> &'static str {
        "smoothed_rules"
    }

    fn apply(
        &self,
        city: &mut City,
        factors: &[FactorDefinition],
        previous_pop: u64,
        current_pop: u64,
    ) {
        if previous_pop == 0 {
            return;
        }
        for (factor_id, value) in city.factors.iter_mut() {
            let Some(definition) = factors.get(factor_id.index()) else {
                continue;
            };
            let Some(rule) = self.rules.get(&definition.name) else {
                continue;
            };
            let Some(target) = rule.target(*value, previous_pop, current_pop) else {
                continue;
            };
            let next = smooth(*value, target, self.smoothing);
            if next.is_finite() {
                *value = definition.clamp(next);
            }
        }
    }
}
