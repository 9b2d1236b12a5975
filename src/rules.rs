//! Rule evaluator - deterministic, explainable severity classification
//!
//! Rules, applied per metric:
//! - point: latest reading outside the normal band -> WATCH, outside the emergency band -> URGENT
//! - trend: the latest `trend_length` readings move strictly toward an emergency bound -> WATCH;
//!   every step must cover at least `trend_min_step` of the normal band's width
//! - missed medication: a `false` within the medication window -> WATCH, the two newest both `false` -> URGENT
//!
//! Overall severity is the maximum over triggered rules. Every triggered rule
//! name is reported, ordered by metric then point before trend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::ValidationError;
use crate::model::{Metric, Observation, Patient, Severity, ThresholdBand};

pub const DEFAULT_TREND_LENGTH: usize = 3;
pub const DEFAULT_MEDICATION_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_LOOKBACK_HOURS: i64 = 72;
pub const DEFAULT_TREND_MIN_STEP: f64 = 0.05;

/// Tunable rule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Consecutive readings that make a trend
    pub trend_length: usize,
    /// Window for the missed-medication rule
    pub medication_window_hours: i64,
    /// Vitals older than this (relative to the newest reading) are ignored
    pub lookback_hours: i64,
    /// Smallest step that counts toward a trend, as a fraction of `high - low`; 0 counts any change
    pub trend_min_step: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            trend_length: DEFAULT_TREND_LENGTH,
            medication_window_hours: DEFAULT_MEDICATION_WINDOW_HOURS,
            lookback_hours: DEFAULT_LOOKBACK_HOURS,
            trend_min_step: DEFAULT_TREND_MIN_STEP,
        }
    }
}

impl RuleConfig {
    /// Readings per metric the evaluator may look at
    pub fn readings_needed(&self) -> usize {
        self.trend_length.max(2)
    }
}

/// Classification plus the rules that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub severity: Severity,
    pub triggered_rules: Vec<String>,
}

impl Evaluation {
    fn from_rules(rules: Vec<(Severity, String)>) -> Self {
        let severity = rules
            .iter()
            .map(|(s, _)| *s)
            .max()
            .unwrap_or(Severity::Normal);
        Self {
            severity,
            triggered_rules: rules.into_iter().map(|(_, name)| name).collect(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleEvaluator {
    config: RuleConfig,
}

impl RuleEvaluator {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Classify `observations` against `patient`'s thresholds
    ///
    /// Observations may arrive in any order. An empty slice is rejected rather
    /// than defaulting to NORMAL.
    pub fn evaluate(
        &self,
        patient: &Patient,
        observations: &[Observation],
    ) -> Result<Evaluation, ValidationError> {
        let reference = observations
            .iter()
            .map(|o| o.timestamp)
            .max()
            .ok_or(ValidationError::NoObservations)?;

        let mut by_metric: BTreeMap<Metric, Vec<&Observation>> = BTreeMap::new();
        for observation in observations {
            by_metric.entry(observation.metric).or_default().push(observation);
        }

        let mut rules = Vec::new();
        for (metric, mut series) in by_metric {
            series.sort_by_key(|o| o.timestamp);

            if metric.is_boolean() {
                rules.extend(self.medication_rule(&series, reference));
                continue;
            }

            let Some(band) = patient.thresholds.band(metric) else {
                continue;
            };
            let cutoff = reference - Duration::hours(self.config.lookback_hours);
            let values: Vec<f64> = series
                .iter()
                .filter(|o| o.timestamp >= cutoff)
                .filter_map(|o| o.value.as_f64())
                .collect();

            rules.extend(point_rule(metric, band, &values));
            rules.extend(self.trend_rule(metric, band, &values));
        }

        let evaluation = Evaluation::from_rules(rules);
        debug!(
            patient_id = %patient.id,
            severity = %evaluation.severity,
            rules = ?evaluation.triggered_rules,
            "Evaluated observation window"
        );
        Ok(evaluation)
    }

    fn trend_rule(&self, metric: Metric, band: &ThresholdBand, values: &[f64]) -> Option<(Severity, String)> {
        let n = self.config.trend_length;
        if n < 2 || values.len() < n {
            return None;
        }
        let run = &values[values.len() - n..];
        let min_step = self.config.trend_min_step * (band.high - band.low);
        let counts = |step: f64| step > 0.0 && step >= min_step;
        let rising = run.windows(2).all(|w| counts(w[1] - w[0]));
        let falling = run.windows(2).all(|w| counts(w[0] - w[1]));

        // A run that starts outside the normal band and heads back into it is recovery.
        let toward_high = rising && run[0] >= band.low;
        let toward_low = falling && run[0] <= band.high;

        (toward_high || toward_low).then(|| (Severity::Watch, format!("{}_trend", metric)))
    }

    fn medication_rule(&self, series: &[&Observation], reference: DateTime<Utc>) -> Option<(Severity, String)> {
        let cutoff = reference - Duration::hours(self.config.medication_window_hours);
        let taken: Vec<bool> = series
            .iter()
            .filter(|o| o.timestamp >= cutoff)
            .filter_map(|o| o.value.as_bool())
            .collect();

        let repeated = taken.len() >= 2 && taken[taken.len() - 2..].iter().all(|t| !t);
        if repeated {
            return Some((Severity::Urgent, "missed_medication_repeated".to_string()));
        }
        taken
            .iter()
            .any(|t| !t)
            .then(|| (Severity::Watch, "missed_medication".to_string()))
    }
}

fn point_rule(metric: Metric, band: &ThresholdBand, values: &[f64]) -> Option<(Severity, String)> {
    let latest = *values.last()?;
    if band.in_emergency(latest) {
        Some((Severity::Urgent, format!("{}_emergency", metric)))
    } else if latest > band.high {
        Some((Severity::Watch, format!("{}_high", metric)))
    } else if latest < band.low {
        Some((Severity::Watch, format!("{}_low", metric)))
    } else {
        None
    }
}
