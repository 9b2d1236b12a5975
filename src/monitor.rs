//! Monitoring orchestrator - one observation submission, end to end
//!
//! RECEIVED -> STORED -> CLASSIFIED -> DONE
//!                                  \-> ENRICHING -> DONE
//!
//! Only validation and storage failures reject a submission. Assistant
//! failures degrade the result to rule-only; a DONE result always carries the
//! classification and the triggered rules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ai::{AdvisorySource, AssistantAdvisory, AssistantBackend, AssistantMediator, CONSULT_PROFESSIONAL};
use crate::config::MonitorConfig;
use crate::error::{AssistantError, Result};
use crate::model::{Metric, Observation, ObservationValue, Patient, Severity};
use crate::rules::{Evaluation, RuleEvaluator};
use crate::store::{ObservationStore, Window};

/// Submission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Stored,
    Classified,
    Enriching,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "RECEIVED",
            Stage::Stored => "STORED",
            Stage::Classified => "CLASSIFIED",
            Stage::Enriching => "ENRICHING",
            Stage::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// What happened on the assistant side of a submission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssistantStatus {
    /// NORMAL classification, no escalation
    NotRequested,
    /// Escalation turned off in configuration
    Disabled,
    Advised,
    Cached,
    Unavailable { reason: String },
    /// Output rejected; `caveat` is the safe text to show instead
    Rejected { reason: String, caveat: String },
}

/// Result of a DONE submission
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub patient_id: String,
    pub observation: Observation,
    pub classification: Severity,
    pub triggered_rules: Vec<String>,
    /// A newer reading of the same metric was already stored
    pub backfilled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<AssistantAdvisory>,
    pub assistant: AssistantStatus,
}

pub struct MonitoringOrchestrator {
    config: MonitorConfig,
    store: Arc<ObservationStore>,
    evaluator: RuleEvaluator,
    mediator: Option<AssistantMediator>,
}

impl MonitoringOrchestrator {
    /// Build with an assistant backend; escalation still honors `config.assistant.enabled`
    pub fn new(config: MonitorConfig, store: Arc<ObservationStore>, backend: Arc<dyn AssistantBackend>) -> Self {
        let mediator = config
            .assistant
            .enabled
            .then(|| AssistantMediator::new(backend, config.assistant.clone()));
        Self {
            evaluator: RuleEvaluator::new(config.rules.clone()),
            config,
            store,
            mediator,
        }
    }

    /// Rule-only monitoring
    pub fn without_assistant(config: MonitorConfig, store: Arc<ObservationStore>) -> Self {
        Self {
            evaluator: RuleEvaluator::new(config.rules.clone()),
            config,
            store,
            mediator: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &ObservationStore {
        &self.store
    }

    pub fn mediator(&self) -> Option<&AssistantMediator> {
        self.mediator.as_ref()
    }

    /// Register a patient with the configured default thresholds
    pub fn register_patient(&self, id: Option<&str>, display_name: &str) -> Result<Patient> {
        self.store
            .register_patient(id, display_name, self.config.thresholds.clone())
    }

    /// Record a reading, classify the patient's recent window and escalate if needed
    pub fn submit_observation(
        &self,
        patient_id: &str,
        metric: &str,
        value: ObservationValue,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<SubmissionResult> {
        self.submit_annotated(patient_id, metric, value, timestamp, None)
    }

    /// `submit_observation` with a caregiver remark kept alongside the reading
    pub fn submit_annotated(
        &self,
        patient_id: &str,
        metric: &str,
        value: ObservationValue,
        timestamp: Option<DateTime<Utc>>,
        note: Option<&str>,
    ) -> Result<SubmissionResult> {
        debug!(patient_id = %patient_id, metric = %metric, stage = %Stage::Received, "Submission");
        let metric: Metric = metric.parse()?;
        let timestamp = timestamp.unwrap_or_else(Utc::now);

        let observation = self
            .store
            .record_annotated(patient_id, metric, value, timestamp, note)?;
        debug!(patient_id = %patient_id, stage = %Stage::Stored, observation_id = %observation.id, "Submission");

        let patient = self.store.patient(patient_id)?;
        let window = self.window(patient_id, Some(&observation))?;
        let backfilled = window
            .iter()
            .any(|o| o.metric == observation.metric && o.timestamp > observation.timestamp);
        if backfilled {
            info!(
                patient_id = %patient_id,
                metric = %metric,
                timestamp = %observation.timestamp,
                "Backfilled reading; the newer reading still drives the point rule"
            );
        }

        let evaluation = self.evaluator.evaluate(&patient, &window)?;
        debug!(
            patient_id = %patient_id,
            stage = %Stage::Classified,
            classification = %evaluation.severity,
            "Submission"
        );

        let (advisory, assistant) = self.enrich(&patient, &window, &evaluation);
        debug!(patient_id = %patient_id, stage = %Stage::Done, "Submission");

        Ok(SubmissionResult {
            patient_id: patient.id,
            observation,
            classification: evaluation.severity,
            triggered_rules: evaluation.triggered_rules,
            backfilled,
            advisory,
            assistant,
        })
    }

    /// Classify the current window without recording anything
    pub fn evaluate_patient(&self, patient_id: &str) -> Result<Evaluation> {
        let patient = self.store.patient(patient_id)?;
        let window = self.window(patient_id, None)?;
        Ok(self.evaluator.evaluate(&patient, &window)?)
    }

    /// Recent readings of every metric the patient has
    ///
    /// `submitted` is always part of the window, even when it is older than
    /// the newest readings of its metric.
    fn window(&self, patient_id: &str, submitted: Option<&Observation>) -> Result<Vec<Observation>> {
        let count = self.config.rules.readings_needed();
        let mut observations = Vec::new();
        for metric in self.store.metrics_for(patient_id)? {
            observations.extend(self.store.recent(patient_id, metric, Window::Count(count))?.to_vec());
        }
        if let Some(submitted) = submitted {
            if !observations.iter().any(|o| o.id == submitted.id) {
                observations.push(submitted.clone());
            }
        }
        Ok(observations)
    }

    fn enrich(
        &self,
        patient: &Patient,
        window: &[Observation],
        evaluation: &Evaluation,
    ) -> (Option<AssistantAdvisory>, AssistantStatus) {
        if !evaluation.severity.is_escalation() {
            return (None, AssistantStatus::NotRequested);
        }
        let Some(mediator) = &self.mediator else {
            return (None, AssistantStatus::Disabled);
        };

        info!(
            patient_id = %patient.id,
            classification = %evaluation.severity,
            stage = %Stage::Enriching,
            "Escalating to assistant"
        );

        match mediator.advise_with_source(patient, window, evaluation.severity, &evaluation.triggered_rules) {
            Ok((advisory, AdvisorySource::Assistant)) => (Some(advisory), AssistantStatus::Advised),
            Ok((advisory, AdvisorySource::Cache)) => (Some(advisory), AssistantStatus::Cached),
            Err(AssistantError::Unavailable(reason)) => {
                warn!(patient_id = %patient.id, reason = %reason, "Assistant unavailable, returning rule-based result");
                (None, AssistantStatus::Unavailable { reason })
            }
            Err(AssistantError::ResponseInvalid(reason)) => {
                warn!(patient_id = %patient.id, reason = %reason, "Assistant response rejected");
                (
                    None,
                    AssistantStatus::Rejected {
                        reason,
                        caveat: CONSULT_PROFESSIONAL.to_string(),
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AssistantPrompt;
    use crate::error::{TransportError, ValidationError};
    use std::time::Duration;

    struct Fixed(&'static str);

    impl AssistantBackend for Fixed {
        fn generate(&self, _prompt: &AssistantPrompt, _timeout: Duration) -> std::result::Result<String, TransportError> {
            Ok(self.0.to_string())
        }
    }

    fn orchestrator(backend: Arc<dyn AssistantBackend>) -> MonitoringOrchestrator {
        let store = Arc::new(ObservationStore::in_memory());
        let orchestrator = MonitoringOrchestrator::new(MonitorConfig::default(), store, backend);
        orchestrator.register_patient(Some("p1"), "Ada").unwrap();
        orchestrator
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Enriching.to_string(), "ENRICHING");
    }

    #[test]
    fn test_unknown_metric_rejected_without_state() {
        let orch = orchestrator(Arc::new(Fixed("ok")));
        let err = orch
            .submit_observation("p1", "weight", ObservationValue::Numeric(70.0), None)
            .unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::UnknownMetric("weight".to_string()))
        );
        assert!(orch.store().metrics_for("p1").unwrap().is_empty());
    }

    #[test]
    fn test_watch_is_advised() {
        let orch = orchestrator(Arc::new(Fixed("Recheck in 30 minutes.")));
        let result = orch
            .submit_observation("p1", "heart_rate", ObservationValue::Numeric(110.0), None)
            .unwrap();
        assert_eq!(result.classification, Severity::Watch);
        assert_eq!(result.assistant, AssistantStatus::Advised);
        assert_eq!(result.advisory.unwrap().guidance, "Recheck in 30 minutes.");
    }

    #[test]
    fn test_rejected_response_carries_safe_caveat() {
        let orch = orchestrator(Arc::new(Fixed("They have pneumonia.")));
        let result = orch
            .submit_observation("p1", "temperature", ObservationValue::Numeric(40.0), None)
            .unwrap();
        assert_eq!(result.classification, Severity::Urgent);
        assert!(result.advisory.is_none());
        match result.assistant {
            AssistantStatus::Rejected { caveat, .. } => assert_eq!(caveat, CONSULT_PROFESSIONAL),
            other => panic!("unexpected status: {:?}", other),
        }
    }

    #[test]
    fn test_disabled_assistant() {
        let store = Arc::new(ObservationStore::in_memory());
        let mut config = MonitorConfig::default();
        config.assistant.enabled = false;
        let orch = MonitoringOrchestrator::new(config, store, Arc::new(Fixed("unused")));
        orch.register_patient(Some("p1"), "Ada").unwrap();

        let result = orch
            .submit_observation("p1", "glucose", ObservationValue::Numeric(250.0), None)
            .unwrap();
        assert_eq!(result.classification, Severity::Urgent);
        assert_eq!(result.assistant, AssistantStatus::Disabled);
        assert!(orch.mediator().is_none());
    }

    #[test]
    fn test_evaluate_patient_requires_observations() {
        let orch = orchestrator(Arc::new(Fixed("ok")));
        let err = orch.evaluate_patient("p1").unwrap_err();
        assert_eq!(err.as_validation(), Some(&ValidationError::NoObservations));
    }

    #[test]
    fn test_result_serialization_omits_missing_advisory() {
        let orch = MonitoringOrchestrator::without_assistant(
            MonitorConfig::default(),
            Arc::new(ObservationStore::in_memory()),
        );
        orch.register_patient(Some("p1"), "Ada").unwrap();
        let result = orch
            .submit_observation("p1", "heart_rate", ObservationValue::Numeric(75.0), None)
            .unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["classification"], "NORMAL");
        assert_eq!(json["assistant"]["status"], "not_requested");
        assert!(json.get("advisory").is_none());
    }
}
