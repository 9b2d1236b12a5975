//! Care record commands - notes, medication schedule, appointments

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use clap::Subcommand;

use crate::cli::output::{format_output, render_appointment, render_note};
use crate::monitor::MonitoringOrchestrator;

#[derive(Subcommand, Debug)]
pub enum NoteCommand {
    /// Attach a free-text note to a patient
    Add {
        /// Patient ID
        patient_id: String,
        /// Short title
        title: String,
        /// Note text
        content: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List a patient's notes, newest first
    List {
        /// Patient ID
        patient_id: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum MedicationCommand {
    /// Add a medication to the schedule
    Add {
        /// Patient ID
        patient_id: String,
        /// Medication name
        name: String,
        /// Dosage, e.g. 10mg
        #[arg(long)]
        dosage: String,
        /// When it is taken, e.g. "daily 08:00"
        #[arg(long)]
        schedule: String,
        #[arg(long)]
        notes: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the medication schedule
    List {
        /// Patient ID
        patient_id: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum AppointmentCommand {
    /// Book an appointment
    Add {
        /// Patient ID
        patient_id: String,
        /// Doctor or clinic contact
        doctor: String,
        /// Date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Time, e.g. 10:30
        #[arg(long)]
        time: String,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// List all appointments, soonest first
    List {
        /// Patient ID
        patient_id: String,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| anyhow!("invalid date {:?}, expected YYYY-MM-DD", raw))
}

pub fn handle_note(orchestrator: &MonitoringOrchestrator, command: NoteCommand) -> Result<()> {
    let store = orchestrator.store();
    match command {
        NoteCommand::Add {
            patient_id,
            title,
            content,
            json,
        } => {
            let note = store.add_note(&patient_id, &title, &content)?;
            match format_output(&note, json) {
                Some(json) => println!("{}", json),
                None => println!("Added note {} for {}", note.id, patient_id),
            }
        }
        NoteCommand::List { patient_id, json } => {
            let notes = store.notes(&patient_id)?;
            match format_output(&notes, json) {
                Some(json) => println!("{}", json),
                None if notes.is_empty() => println!("No notes for {}", patient_id),
                None => {
                    for note in &notes {
                        println!("{}", render_note(note));
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn handle_medication(orchestrator: &MonitoringOrchestrator, command: MedicationCommand) -> Result<()> {
    let store = orchestrator.store();
    match command {
        MedicationCommand::Add {
            patient_id,
            name,
            dosage,
            schedule,
            notes,
            json,
        } => {
            let medication = store.add_medication(&patient_id, &name, &dosage, &schedule, notes.as_deref())?;
            match format_output(&medication, json) {
                Some(json) => println!("{}", json),
                None => println!("Scheduled {} for {}", medication, patient_id),
            }
        }
        MedicationCommand::List { patient_id, json } => {
            let medications = store.patient(&patient_id)?.medications;
            match format_output(&medications, json) {
                Some(json) => println!("{}", json),
                None if medications.is_empty() => println!("No medications scheduled for {}", patient_id),
                None => {
                    for medication in &medications {
                        println!("  [{}] {}", medication.id, medication);
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn handle_appointment(orchestrator: &MonitoringOrchestrator, command: AppointmentCommand) -> Result<()> {
    let store = orchestrator.store();
    match command {
        AppointmentCommand::Add {
            patient_id,
            doctor,
            date,
            time,
            location,
            notes,
            json,
        } => {
            let date = parse_date(&date)?;
            let appointment =
                store.add_appointment(&patient_id, &doctor, date, &time, location.as_deref(), notes.as_deref())?;
            match format_output(&appointment, json) {
                Some(json) => println!("{}", json),
                None => println!("Booked {}", render_appointment(&appointment).trim_start()),
            }
        }
        AppointmentCommand::List { patient_id, json } => {
            let appointments = store.patient(&patient_id)?.appointments;
            match format_output(&appointments, json) {
                Some(json) => println!("{}", json),
                None if appointments.is_empty() => println!("No appointments for {}", patient_id),
                None => {
                    for appointment in &appointments {
                        println!("{}", render_appointment(appointment));
                    }
                }
            }
        }
    }
    Ok(())
}
