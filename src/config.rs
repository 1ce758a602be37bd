//! Run configuration for the migration engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ValidationReport;
use crate::models::feedback::FeedbackRule;

/// Which migration strategy the decision stage uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    /// Binomially sampled flows for whole groups, with cost-weighted probabilities.
    #[default]
    Aggregate,
    /// Every member picks a single best destination and rolls for it.
    PerUnit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Slope of the logistic squash applied to the raw attraction sum.
    pub attraction_steepness: f64,
    /// Slope of the capacity-resistance curve around `population == capacity`.
    pub capacity_steepness: f64,
    /// Exponential decay rate of attraction with distance.
    pub distance_decay_lambda: f64,
    pub migration_probability_steepness: f64,
    /// Midpoint of the per-unit probability curve.
    pub migration_probability_threshold: f64,
    pub cost_sensitivity: f64,
    pub base_migration_cost: f64,
    /// Share of the gap to the feedback target closed each tick, in [0, 1].
    pub feedback_smoothing_factor: f64,
    /// Feedback runs on ticks divisible by this value.
    pub feedback_interval: u64,
    /// Feedback rule per factor name; factors without an entry are left alone.
    pub feedback_rules: BTreeMap<String, FeedbackRule>,
    pub decision_mode: DecisionMode,
    pub max_ticks: u64,
    pub check_stability: bool,
    /// Largest total absolute population change still considered stable.
    pub stability_threshold: f64,
    pub stability_check_interval: u64,
    pub min_ticks_before_stability_check: u64,
    /// Fixed seed for reproducible runs. A seed is drawn from OS entropy when absent.
    pub random_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            attraction_steepness: 1.0,
            capacity_steepness: 10.0,
            distance_decay_lambda: 0.01,
            migration_probability_steepness: 5.0,
            migration_probability_threshold: 0.0,
            cost_sensitivity: 0.1,
            base_migration_cost: 1.0,
            feedback_smoothing_factor: 0.3,
            feedback_interval: 1,
            feedback_rules: BTreeMap::new(),
            decision_mode: DecisionMode::Aggregate,
            max_ticks: 100,
            check_stability: true,
            stability_threshold: 0.0,
            stability_check_interval: 1,
            min_ticks_before_stability_check: 5,
            random_seed: None,
        }
    }
}

impl SimulationConfig {
    /// Collects every invalid parameter instead of stopping at the first one.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        let positive = [
            ("attraction_steepness", self.attraction_steepness),
            ("capacity_steepness", self.capacity_steepness),
            (
                "migration_probability_steepness",
                self.migration_probability_steepness,
            ),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                report.push(field, format!("must be a positive number, got {value}"));
            }
        }

        let non_negative = [
            ("distance_decay_lambda", self.distance_decay_lambda),
            ("cost_sensitivity", self.cost_sensitivity),
            ("base_migration_cost", self.base_migration_cost),
            ("stability_threshold", self.stability_threshold),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                report.push(field, format!("must be zero or positive, got {value}"));
            }
        }

        if !self.migration_probability_threshold.is_finite() {
            report.push(
                "migration_probability_threshold",
                format!(
                    "must be finite, got {}",
                    self.migration_probability_threshold
                ),
            );
        }

        if !(0.0..=1.0).contains(&self.feedback_smoothing_factor) {
            report.push(
                "feedback_smoothing_factor",
                format!(
                    "must lie in [0, 1], got {}",
                    self.feedback_smoothing_factor
                ),
            );
        }

        if self.feedback_interval == 0 {
            report.push("feedback_interval", "must be greater than zero");
        }

        if self.max_ticks == 0 {
            report.push("max_ticks", "must be greater than zero");
        }

        if self.stability_check_interval == 0 {
            report.push("stability_check_interval", "must be greater than zero");
        }

        if self.min_ticks_before_stability_check >= self.max_ticks {
            report.push(
                "min_ticks_before_stability_check",
                format!(
                    "must be below max_ticks ({}), got {}",
                    self.max_ticks, self.min_ticks_before_stability_check
                ),
            );
        }

        for (factor, rule) in &self.feedback_rules {
            if let Err(message) = rule.check() {
                report.push("feedback_rules", format!("{factor}: {message}"));
            }
        }

        report
    }

    /// Whether the stability check is due on `tick`.
    pub fn stability_check_due(&self, tick: u64) -> bool {
        self.check_stability
            && tick >= self.min_ticks_before_stability_check
            && tick % self.stability_check_interval == 0
    }
}
