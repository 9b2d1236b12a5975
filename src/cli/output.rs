//! Output formatting for CLI commands

use serde::Serialize;

use crate::model::{Appointment, CareNote, Observation, Patient};
use crate::monitor::{AssistantStatus, SubmissionResult};

/// Pretty JSON for `--json`, `None` when the caller should render text
pub fn format_output<T: Serialize>(data: &T, json: bool) -> Option<String> {
    json.then(|| serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string()))
}

pub fn render_patient(patient: &Patient) -> String {
    let status = if patient.archived { "archived" } else { "active" };
    format!(
        "  {} | {} | {} | since {}",
        patient.id,
        patient.display_name,
        status,
        patient.created_at.format("%Y-%m-%d")
    )
}

pub fn render_observation(observation: &Observation) -> String {
    let mut line = format!(
        "  {} | {}: {} {}",
        observation.timestamp.format("%Y-%m-%d %H:%M:%S"),
        observation.metric,
        observation.value,
        observation.metric.unit()
    )
    .trim_end()
    .to_string();
    if let Some(note) = &observation.note {
        line.push_str(&format!(" - {}", note));
    }
    line
}

pub fn render_appointment(appointment: &Appointment) -> String {
    let mut line = format!("  {} {} | {}", appointment.date, appointment.time, appointment.doctor);
    if let Some(location) = &appointment.location {
        line.push_str(&format!(" @ {}", location));
    }
    line
}

pub fn render_note(note: &CareNote) -> String {
    format!(
        "  [{}] {} | {}\n    {}",
        note.id,
        note.created_at.format("%Y-%m-%d %H:%M"),
        note.title,
        note.content
    )
}

pub fn render_submission(result: &SubmissionResult) -> String {
    let mut out = format!(
        "Recorded {} = {} for {}",
        result.observation.metric, result.observation.value, result.patient_id
    );
    if result.backfilled {
        out.push_str(" (backfilled; a newer reading exists)");
    }
    out.push_str(&format!("\nClassification: {}", result.classification));

    if !result.triggered_rules.is_empty() {
        out.push_str(&format!("\nTriggered rules: {}", result.triggered_rules.join(", ")));
    }

    match &result.assistant {
        AssistantStatus::NotRequested => {}
        AssistantStatus::Disabled => out.push_str("\nAssistant: disabled"),
        AssistantStatus::Advised | AssistantStatus::Cached => {
            if let Some(advisory) = &result.advisory {
                let label = if result.assistant == AssistantStatus::Cached {
                    "Guidance (cached)"
                } else {
                    "Guidance"
                };
                out.push_str(&format!("\n\n{}:\n{}", label, advisory.guidance));
                for caveat in &advisory.caveats {
                    out.push_str(&format!("\n  * {}", caveat));
                }
            }
        }
        AssistantStatus::Unavailable { reason } => {
            out.push_str(&format!("\nAssistant unavailable: {}", reason));
        }
        AssistantStatus::Rejected { caveat, .. } => {
            out.push_str(&format!("\n\n{}", caveat));
        }
    }

    out
}
