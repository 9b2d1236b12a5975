//! Eldercare Monitor - rule-based vitals classification with AI caregiver guidance

pub mod ai;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod rules;
pub mod store;

pub use ai::{AnthropicBackend, AssistantAdvisory, AssistantBackend, AssistantConfig, AssistantMediator, AssistantPrompt};
pub use config::MonitorConfig;
pub use error::{AssistantError, MonitorError, TransportError, ValidationError};
pub use model::{
    Appointment, CareNote, Medication, Metric, Observation, ObservationValue, Patient, Severity, ThresholdBand, Thresholds,
};
pub use monitor::{AssistantStatus, MonitoringOrchestrator, SubmissionResult};
pub use rules::{Evaluation, RuleConfig, RuleEvaluator};
pub use store::{ObservationStore, PatientSummary, RecentObservations, Window};
