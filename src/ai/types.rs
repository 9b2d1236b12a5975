//! Advisory and snapshot types shared by the mediator and its cache

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{Metric, Observation, ObservationValue, Severity};

/// AI-generated guidance attached to a WATCH/URGENT result; never persisted by the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantAdvisory {
    pub classification: Severity,
    pub guidance: String,
    pub caveats: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Latest reading of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotReading {
    pub metric: Metric,
    pub value: ObservationValue,
    pub timestamp: DateTime<Utc>,
}

/// Latest value per metric, in metric order
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MetricSnapshot {
    pub readings: Vec<SnapshotReading>,
}

impl MetricSnapshot {
    pub fn from_observations(observations: &[Observation]) -> Self {
        let mut latest: BTreeMap<Metric, &Observation> = BTreeMap::new();
        for observation in observations {
            match latest.get(&observation.metric) {
                Some(current) if current.timestamp > observation.timestamp => {}
                _ => {
                    latest.insert(observation.metric, observation);
                }
            }
        }

        Self {
            readings: latest
                .into_values()
                .map(|o| SnapshotReading {
                    metric: o.metric,
                    value: o.value,
                    timestamp: o.timestamp,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Values rounded to each metric's snapshot precision, for cache keys
    pub fn rounded(&self) -> Vec<(Metric, i64)> {
        self.readings
            .iter()
            .map(|r| {
                let key = match r.value {
                    ObservationValue::Boolean(b) => i64::from(b),
                    ObservationValue::Numeric(v) => (v / r.metric.snapshot_precision()).round() as i64,
                };
                (r.metric, key)
            })
            .collect()
    }
}
