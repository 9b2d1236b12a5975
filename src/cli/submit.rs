//! Submit command - record one reading and print the classification

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Args;

use crate::cli::output::{format_output, render_submission};
use crate::model::{Metric, ObservationValue};
use crate::monitor::MonitoringOrchestrator;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Patient ID
    pub patient_id: String,

    /// Metric: heart_rate, blood_pressure_systolic, blood_pressure_diastolic,
    /// temperature, glucose, medication_taken
    pub metric: String,

    /// Reading value (true/false for medication_taken)
    pub value: String,

    /// Measurement time, RFC 3339 (defaults to now)
    #[arg(long)]
    pub at: Option<String>,

    /// Remark kept with the reading, e.g. "after a walk"
    #[arg(long)]
    pub note: Option<String>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| anyhow!("invalid timestamp {:?}, expected RFC 3339 like 2024-03-01T08:00:00Z", raw))
}

pub fn handle_submit(orchestrator: &MonitoringOrchestrator, args: SubmitArgs) -> Result<()> {
    let metric: Metric = args.metric.parse()?;
    let value = ObservationValue::parse_for(metric, &args.value)?;
    let timestamp = args.at.as_deref().map(parse_timestamp).transpose()?;

    let result = orchestrator.submit_annotated(
        &args.patient_id,
        metric.as_str(),
        value,
        timestamp,
        args.note.as_deref(),
    )?;

    match format_output(&result, args.json) {
        Some(json) => println!("{}", json),
        None => println!("{}", render_submission(&result)),
    }
    Ok(())
}
