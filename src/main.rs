//! Eldercare Monitor CLI
//!
//! Record patient vitals, classify them against monitoring rules and show
//! caregiver guidance.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eldercare_monitor::cli::{
    handle_appointment, handle_archive, handle_history, handle_medication, handle_note, handle_patients,
    handle_register, handle_submit, handle_threshold, run_summary, AppointmentCommand, HistoryArgs,
    MedicationCommand, NoteCommand, RegisterArgs, SubmitArgs, SummaryArgs, ThresholdArgs,
};
use eldercare_monitor::{AnthropicBackend, MonitorConfig, MonitoringOrchestrator, ObservationStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ecm")]
#[command(about = "Eldercare Monitor - classify patient vitals and mediate AI caregiver guidance")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/eldercare-monitor/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new patient with the default thresholds
    Register(RegisterArgs),
    /// List registered patients
    Patients {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a reading and classify the patient
    Submit(SubmitArgs),
    /// Show recent readings of one metric
    History(HistoryArgs),
    /// Adjust a patient's threshold band
    Threshold(ThresholdArgs),
    /// Archive a patient (history is kept)
    Archive {
        /// Patient ID
        patient_id: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a patient's current status and recent readings
    Summary(SummaryArgs),
    /// Caregiver notes
    Note {
        #[command(subcommand)]
        command: NoteCommand,
    },
    /// Medication schedule
    Medication {
        #[command(subcommand)]
        command: MedicationCommand,
    },
    /// Doctor appointments
    Appointment {
        #[command(subcommand)]
        command: AppointmentCommand,
    },
}

fn build_orchestrator(config: MonitorConfig) -> Result<MonitoringOrchestrator> {
    let data_dir = config.data_dir();
    let store = ObservationStore::open(&data_dir)
        .with_context(|| format!("cannot open data directory {}", data_dir.display()))?
        .with_max_clock_skew(config.max_clock_skew());
    let store = Arc::new(store);

    if !config.assistant.enabled {
        debug!("Assistant disabled in config");
        return Ok(MonitoringOrchestrator::without_assistant(config, store));
    }

    if config.assistant.api_key.trim().is_empty() {
        warn!("ANTHROPIC_API_KEY not set, running with rule-based classification only");
        return Ok(MonitoringOrchestrator::without_assistant(config, store));
    }

    let backend = AnthropicBackend::new(config.assistant.clone())?;
    debug!(endpoint = %backend.endpoint(), "Assistant backend ready");
    Ok(MonitoringOrchestrator::new(config, store, Arc::new(backend)))
}

fn main() -> Result<()> {
    // RUST_LOG overrides the default filter, e.g. RUST_LOG=debug ecm submit ...
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("eldercare_monitor=info,ecm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig::auto_load(cli.config.as_deref())?;
    let orchestrator = build_orchestrator(config)?;

    match cli.command {
        Commands::Register(args) => handle_register(&orchestrator, args)?,
        Commands::Patients { json } => handle_patients(&orchestrator, json)?,
        Commands::Submit(args) => handle_submit(&orchestrator, args)?,
        Commands::History(args) => handle_history(&orchestrator, args)?,
        Commands::Threshold(args) => handle_threshold(&orchestrator, args)?,
        Commands::Archive { patient_id, json } => handle_archive(&orchestrator, &patient_id, json)?,
        Commands::Summary(args) => run_summary(&orchestrator, &args)?,
        Commands::Note { command } => handle_note(&orchestrator, command)?,
        Commands::Medication { command } => handle_medication(&orchestrator, command)?,
        Commands::Appointment { command } => handle_appointment(&orchestrator, command)?,
    }

    Ok(())
}
