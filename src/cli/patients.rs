//! Patient commands - register, list, thresholds, archive, history

use anyhow::{anyhow, Result};
use clap::Args;

use crate::cli::output::{format_output, render_observation, render_patient};
use crate::model::{Metric, ThresholdBand};
use crate::monitor::MonitoringOrchestrator;
use crate::store::Window;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Display name
    pub name: String,

    /// Patient ID (generated when omitted)
    #[arg(long)]
    pub id: Option<String>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ThresholdArgs {
    /// Patient ID
    pub patient_id: String,

    /// Numeric metric to adjust
    pub metric: String,

    #[arg(long)]
    pub low: Option<f64>,

    #[arg(long)]
    pub high: Option<f64>,

    #[arg(long)]
    pub emergency_low: Option<f64>,

    #[arg(long)]
    pub emergency_high: Option<f64>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Patient ID
    pub patient_id: String,

    /// Metric to show
    pub metric: String,

    /// Show the newest N readings
    #[arg(long, short, default_value = "10", conflicts_with = "hours")]
    pub limit: usize,

    /// Show readings within N hours of the newest one
    #[arg(long)]
    pub hours: Option<i64>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

pub fn handle_register(orchestrator: &MonitoringOrchestrator, args: RegisterArgs) -> Result<()> {
    let patient = orchestrator.register_patient(args.id.as_deref(), &args.name)?;
    match format_output(&patient, args.json) {
        Some(json) => println!("{}", json),
        None => println!("Registered {} ({})", patient.display_name, patient.id),
    }
    Ok(())
}

pub fn handle_patients(orchestrator: &MonitoringOrchestrator, json: bool) -> Result<()> {
    let patients = orchestrator.store().patients();
    match format_output(&patients, json) {
        Some(json) => println!("{}", json),
        None if patients.is_empty() => println!("No patients registered"),
        None => {
            println!("{} patient(s):\n", patients.len());
            for patient in &patients {
                println!("{}", render_patient(patient));
            }
        }
    }
    Ok(())
}

/// Start from the patient's current band and replace the given bounds
pub fn merge_band(current: ThresholdBand, args: &ThresholdArgs) -> ThresholdBand {
    ThresholdBand {
        low: args.low.unwrap_or(current.low),
        high: args.high.unwrap_or(current.high),
        emergency_low: args.emergency_low.unwrap_or(current.emergency_low),
        emergency_high: args.emergency_high.unwrap_or(current.emergency_high),
    }
}

pub fn handle_threshold(orchestrator: &MonitoringOrchestrator, args: ThresholdArgs) -> Result<()> {
    let metric: Metric = args.metric.parse()?;
    let patient = orchestrator.store().patient(&args.patient_id)?;
    let current = patient
        .thresholds
        .band(metric)
        .copied()
        .ok_or_else(|| anyhow!("{} has no threshold band", metric))?;

    let band = merge_band(current, &args);
    let patient = orchestrator
        .store()
        .update_thresholds(&args.patient_id, metric, band)?;

    match format_output(&patient.thresholds, args.json) {
        Some(json) => println!("{}", json),
        None => println!(
            "{} {}: normal {}..{}, emergency {}..{}",
            patient.id, metric, band.low, band.high, band.emergency_low, band.emergency_high
        ),
    }
    Ok(())
}

pub fn handle_archive(orchestrator: &MonitoringOrchestrator, patient_id: &str, json: bool) -> Result<()> {
    let patient = orchestrator.store().archive_patient(patient_id)?;
    match format_output(&patient, json) {
        Some(json) => println!("{}", json),
        None => println!("Archived {} ({})", patient.display_name, patient.id),
    }
    Ok(())
}

pub fn handle_history(orchestrator: &MonitoringOrchestrator, args: HistoryArgs) -> Result<()> {
    let metric: Metric = args.metric.parse()?;
    let window = match args.hours {
        Some(hours) if hours <= 0 => return Err(anyhow!("--hours must be positive")),
        Some(hours) => Window::Duration(chrono::Duration::hours(hours)),
        None => Window::Count(args.limit),
    };

    let recent = orchestrator.store().recent(&args.patient_id, metric, window)?;
    let observations = recent.to_vec();

    match format_output(&observations, args.json) {
        Some(json) => println!("{}", json),
        None if observations.is_empty() => println!("No {} readings for {}", metric, args.patient_id),
        None => {
            for observation in &observations {
                println!("{}", render_observation(observation));
            }
        }
    }
    Ok(())
}
