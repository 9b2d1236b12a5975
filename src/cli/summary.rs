//! `ecm summary` - caregiver view of one patient

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::output::{render_appointment, render_observation};
use crate::error::ValidationError;
use crate::monitor::MonitoringOrchestrator;
use crate::rules::Evaluation;
use crate::store::PatientSummary;

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Patient ID
    pub patient_id: String,

    /// Number of recent readings to list
    #[arg(long, short, default_value = "5")]
    pub limit: usize,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct SummaryOutput {
    #[serde(flatten)]
    pub summary: PatientSummary,
    /// `None` until the patient has readings
    pub evaluation: Option<Evaluation>,
}

/// Build the summary text (pure, for tests)
pub fn build_summary_message(summary: &PatientSummary, evaluation: Option<&Evaluation>) -> String {
    let mut msg = format!("{} ({})", summary.display_name, summary.patient_id);
    if summary.archived {
        msg.push_str(" [archived]");
    }

    match evaluation {
        Some(evaluation) => {
            msg.push_str(&format!("\nStatus: {}", evaluation.severity));
            for rule in &evaluation.triggered_rules {
                msg.push_str(&format!("\n  ! {}", rule));
                if rule.starts_with("missed_medication") && !summary.medications.is_empty() {
                    let scheduled: Vec<String> = summary.medications.iter().map(|m| m.to_string()).collect();
                    msg.push_str(&format!(" (scheduled: {})", scheduled.join("; ")));
                }
            }
        }
        None => msg.push_str("\nStatus: no readings yet"),
    }

    if !summary.counts.is_empty() {
        let counts: Vec<String> = summary
            .counts
            .iter()
            .map(|(metric, count)| format!("{} {}", metric, count))
            .collect();
        msg.push_str(&format!("\nReadings: {}", counts.join(", ")));
    }

    if !summary.medications.is_empty() {
        msg.push_str("\n\nMedications:");
        for medication in &summary.medications {
            msg.push_str(&format!("\n  {}", medication));
        }
    }

    if !summary.upcoming_appointments.is_empty() {
        msg.push_str("\n\nUpcoming appointments:");
        for appointment in &summary.upcoming_appointments {
            msg.push('\n');
            msg.push_str(&render_appointment(appointment));
        }
    }

    if !summary.recent.is_empty() {
        msg.push_str("\n\nRecent:");
        for observation in &summary.recent {
            msg.push('\n');
            msg.push_str(&render_observation(observation));
        }
    }

    msg
}

pub fn run_summary(orchestrator: &MonitoringOrchestrator, args: &SummaryArgs) -> Result<()> {
    let summary = orchestrator.store().summary(&args.patient_id, args.limit)?;
    let evaluation = match orchestrator.evaluate_patient(&args.patient_id) {
        Ok(evaluation) => Some(evaluation),
        Err(e) if e.as_validation() == Some(&ValidationError::NoObservations) => None,
        Err(e) => return Err(e.into()),
    };

    if args.json {
        let output = SummaryOutput { summary, evaluation };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", build_summary_message(&summary, evaluation.as_ref()));
    }
    Ok(())
}
