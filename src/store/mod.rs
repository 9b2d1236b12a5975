//! Observation store - patients and their timestamp-ordered observation series
//!
//! Each patient is an independent partition behind its own locks, so writers
//! for distinct patients never contend. Series are kept ascending by timestamp
//! and shared copy-on-write, which is what makes `recent` snapshots cheap and
//! restartable.

pub mod journal;
pub mod window;

pub use journal::Journal;
pub use window::{RecentIter, RecentObservations, Window};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::error::{Result, ValidationError};
use crate::model::{
    optional, required, Appointment, CareNote, Medication, Metric, Observation, ObservationValue, Patient,
    ThresholdBand, Thresholds,
};

/// Readings may be stamped at most this far past the wall clock
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: i64 = 300;

/// One patient's record and observation history
struct Partition {
    patient: RwLock<Patient>,
    series: RwLock<HashMap<Metric, Arc<Vec<Observation>>>>,
    notes: RwLock<Vec<CareNote>>,
}

impl Partition {
    fn new(patient: Patient) -> Self {
        Self {
            patient: RwLock::new(patient),
            series: RwLock::new(HashMap::new()),
            notes: RwLock::new(Vec::new()),
        }
    }

    fn insert(&self, observation: Observation) {
        let mut series = write(&self.series);
        let entries = Arc::make_mut(series.entry(observation.metric).or_default());
        let at = entries.partition_point(|o| o.timestamp <= observation.timestamp);
        entries.insert(at, observation);
    }
}

/// Dashboard view: counts per metric plus the newest observations overall
#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    pub patient_id: String,
    pub display_name: String,
    pub archived: bool,
    pub counts: BTreeMap<Metric, usize>,
    pub recent: Vec<Observation>,
    pub medications: Vec<Medication>,
    /// Appointments from today on, soonest first
    pub upcoming_appointments: Vec<Appointment>,
}

/// Observation store
pub struct ObservationStore {
    partitions: RwLock<HashMap<String, Arc<Partition>>>,
    journal: Option<Journal>,
    /// Serializes rewrites of the patient file
    persist_lock: Mutex<()>,
    max_clock_skew: Duration,
}

impl ObservationStore {
    /// Volatile store, nothing written to disk
    pub fn in_memory() -> Self {
        Self {
            partitions: RwLock::new(HashMap::new()),
            journal: None,
            persist_lock: Mutex::new(()),
            max_clock_skew: Duration::seconds(DEFAULT_MAX_CLOCK_SKEW_SECS),
        }
    }

    /// Durable store rooted at `dir`, replaying any existing journal
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let journal = Journal::open(dir)?;

        let mut partitions = HashMap::new();
        for patient in journal.load_patients()? {
            partitions.insert(patient.id.clone(), Arc::new(Partition::new(patient)));
        }

        let mut replayed = 0usize;
        for observation in journal.load_observations()? {
            match partitions.get(&observation.patient_id) {
                Some(partition) => {
                    partition.insert(observation);
                    replayed += 1;
                }
                None => warn!(
                    patient_id = %observation.patient_id,
                    observation_id = %observation.id,
                    "Dropping journaled observation for unknown patient"
                ),
            }
        }

        for note in journal.load_notes()? {
            match partitions.get(&note.patient_id) {
                Some(partition) => write(&partition.notes).push(note),
                None => warn!(patient_id = %note.patient_id, note_id = %note.id, "Dropping note for unknown patient"),
            }
        }

        info!(
            patients = partitions.len(),
            observations = replayed,
            dir = %journal.dir().display(),
            "Opened observation store"
        );

        Ok(Self {
            partitions: RwLock::new(partitions),
            journal: Some(journal),
            persist_lock: Mutex::new(()),
            max_clock_skew: Duration::seconds(DEFAULT_MAX_CLOCK_SKEW_SECS),
        })
    }

    /// How far past the wall clock a reading may be stamped
    pub fn with_max_clock_skew(mut self, skew: Duration) -> Self {
        self.max_clock_skew = skew;
        self
    }

    pub fn max_clock_skew(&self) -> Duration {
        self.max_clock_skew
    }

    pub fn is_durable(&self) -> bool {
        self.journal.is_some()
    }

    // ------------------------------------------------------------------------
    // Patients
    // ------------------------------------------------------------------------

    /// Register a patient; a UUID-based id is generated when `id` is `None`
    pub fn register_patient(
        &self,
        id: Option<&str>,
        display_name: &str,
        thresholds: Thresholds,
    ) -> Result<Patient> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ValidationError::EmptyDisplayName.into());
        }
        thresholds.validate()?;

        let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => short_id(),
        };

        let patient = Patient::new(id.clone(), display_name, thresholds);
        {
            let mut partitions = write(&self.partitions);
            if partitions.contains_key(&id) {
                return Err(ValidationError::DuplicatePatient(id).into());
            }
            partitions.insert(id.clone(), Arc::new(Partition::new(patient.clone())));
        }

        if let Err(e) = self.persist_patients() {
            write(&self.partitions).remove(&id);
            return Err(e);
        }

        info!(patient_id = %id, "Registered patient");
        Ok(patient)
    }

    pub fn patient(&self, patient_id: &str) -> Result<Patient> {
        let partition = self.partition(patient_id)?;
        let patient = read(&partition.patient).clone();
        Ok(patient)
    }

    /// All patients, archived included, ordered by id
    pub fn patients(&self) -> Vec<Patient> {
        let partitions: Vec<Arc<Partition>> = read(&self.partitions).values().cloned().collect();
        let mut patients: Vec<Patient> = partitions
            .iter()
            .map(|p| read(&p.patient).clone())
            .collect();
        patients.sort_by(|a, b| a.id.cmp(&b.id));
        patients
    }

    /// Caregiver override of one metric's band
    pub fn update_thresholds(
        &self,
        patient_id: &str,
        metric: Metric,
        band: ThresholdBand,
    ) -> Result<Patient> {
        let patient = self.update_patient(patient_id, |patient| {
            patient.thresholds.set(metric, band)?;
            Ok(patient.clone())
        })?;
        debug!(patient_id = %patient_id, metric = %metric, "Updated threshold band");
        Ok(patient)
    }

    /// Archive a patient; history is kept, new observations are rejected
    pub fn archive_patient(&self, patient_id: &str) -> Result<Patient> {
        let patient = self.update_patient(patient_id, |patient| {
            patient.archived = true;
            Ok(patient.clone())
        })?;
        info!(patient_id = %patient_id, "Archived patient");
        Ok(patient)
    }

    // ------------------------------------------------------------------------
    // Care records
    // ------------------------------------------------------------------------

    /// Add a medication to an active patient's schedule
    pub fn add_medication(
        &self,
        patient_id: &str,
        name: &str,
        dosage: &str,
        schedule: &str,
        notes: Option<&str>,
    ) -> Result<Medication> {
        let medication = Medication {
            id: short_id(),
            name: required("medication name", name)?,
            dosage: required("dosage", dosage)?,
            schedule: required("schedule", schedule)?,
            notes: optional(notes),
            added_at: Utc::now(),
        };

        let added = medication.clone();
        self.update_patient(patient_id, |patient| {
            if patient.archived {
                return Err(ValidationError::PatientArchived(patient.id.clone()).into());
            }
            patient.medications.push(added);
            Ok(())
        })?;
        info!(patient_id = %patient_id, medication_id = %medication.id, "Added medication");
        Ok(medication)
    }

    /// Book an appointment for an active patient
    pub fn add_appointment(
        &self,
        patient_id: &str,
        doctor: &str,
        date: NaiveDate,
        time: &str,
        location: Option<&str>,
        notes: Option<&str>,
    ) -> Result<Appointment> {
        let appointment = Appointment {
            id: short_id(),
            doctor: required("doctor", doctor)?,
            date,
            time: required("time", time)?,
            location: optional(location),
            notes: optional(notes),
        };

        let added = appointment.clone();
        self.update_patient(patient_id, |patient| {
            if patient.archived {
                return Err(ValidationError::PatientArchived(patient.id.clone()).into());
            }
            patient.appointments.push(added);
            patient.appointments.sort_by(|a, b| a.date.cmp(&b.date));
            Ok(())
        })?;
        info!(patient_id = %patient_id, appointment_id = %appointment.id, "Added appointment");
        Ok(appointment)
    }

    /// Attach a free-text note; archived patients may still receive notes
    pub fn add_note(&self, patient_id: &str, title: &str, content: &str) -> Result<CareNote> {
        let partition = self.partition(patient_id)?;
        let note = CareNote {
            id: short_id(),
            patient_id: patient_id.to_string(),
            title: required("title", title)?,
            content: required("content", content)?,
            created_at: Utc::now(),
        };

        if let Some(journal) = &self.journal {
            journal.append_note(&note)?;
        }
        write(&partition.notes).push(note.clone());

        debug!(patient_id = %patient_id, note_id = %note.id, "Added note");
        Ok(note)
    }

    /// Notes, newest first
    pub fn notes(&self, patient_id: &str) -> Result<Vec<CareNote>> {
        let partition = self.partition(patient_id)?;
        let mut notes = read(&partition.notes).clone();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    // ------------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------------

    /// Validate and append an observation
    ///
    /// Nothing is retained when validation or the journal write fails.
    pub fn record(
        &self,
        patient_id: &str,
        metric: Metric,
        value: ObservationValue,
        timestamp: DateTime<Utc>,
    ) -> Result<Observation> {
        self.record_annotated(patient_id, metric, value, timestamp, None)
    }

    /// `record` with an optional caregiver remark on the reading
    pub fn record_annotated(
        &self,
        patient_id: &str,
        metric: Metric,
        value: ObservationValue,
        timestamp: DateTime<Utc>,
        note: Option<&str>,
    ) -> Result<Observation> {
        let partition = self.partition(patient_id)?;
        if read(&partition.patient).archived {
            return Err(ValidationError::PatientArchived(patient_id.to_string()).into());
        }
        metric.validate(&value)?;

        // a far-future reading would become the reference time and hide real ones
        let latest_accepted = Utc::now() + self.max_clock_skew;
        if timestamp > latest_accepted {
            return Err(ValidationError::FutureTimestamp {
                timestamp,
                latest_accepted,
            }
            .into());
        }

        let observation = Observation {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            metric,
            value,
            timestamp,
            note: optional(note),
        };

        if let Some(journal) = &self.journal {
            journal.append_observation(&observation)?;
        }
        partition.insert(observation.clone());

        debug!(
            patient_id = %patient_id,
            metric = %metric,
            value = %value,
            "Recorded observation"
        );
        Ok(observation)
    }

    /// Newest-first view of one metric series, bounded by `window`
    pub fn recent(&self, patient_id: &str, metric: Metric, window: Window) -> Result<RecentObservations> {
        let partition = self.partition(patient_id)?;
        let series = read(&partition.series).get(&metric).cloned();
        Ok(match series {
            Some(series) => RecentObservations::new(series, window),
            None => RecentObservations::empty(window),
        })
    }

    /// Metrics with at least one observation, in declaration order
    pub fn metrics_for(&self, patient_id: &str) -> Result<Vec<Metric>> {
        let partition = self.partition(patient_id)?;
        let series = read(&partition.series);
        Ok(Metric::ALL
            .iter()
            .copied()
            .filter(|m| series.get(m).map_or(false, |s| !s.is_empty()))
            .collect())
    }

    pub fn summary(&self, patient_id: &str, limit: usize) -> Result<PatientSummary> {
        let partition = self.partition(patient_id)?;
        let patient = read(&partition.patient).clone();
        let series: Vec<Arc<Vec<Observation>>> = read(&partition.series).values().cloned().collect();

        let counts = series
            .iter()
            .filter_map(|s| s.first().map(|o| (o.metric, s.len())))
            .collect();

        let mut recent: Vec<Observation> = series.iter().flat_map(|s| s.iter().cloned()).collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);

        let today = Utc::now().date_naive();
        let upcoming_appointments = patient
            .appointments
            .iter()
            .filter(|a| a.date >= today)
            .cloned()
            .collect();

        Ok(PatientSummary {
            patient_id: patient.id,
            display_name: patient.display_name,
            archived: patient.archived,
            counts,
            recent,
            medications: patient.medications,
            upcoming_appointments,
        })
    }

    fn partition(&self, patient_id: &str) -> Result<Arc<Partition>> {
        read(&self.partitions)
            .get(patient_id)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownPatient(patient_id.to_string()).into())
    }

    /// Apply `change` to the patient record and persist, restoring it if either fails
    fn update_patient<T>(&self, patient_id: &str, change: impl FnOnce(&mut Patient) -> Result<T>) -> Result<T> {
        let partition = self.partition(patient_id)?;
        let (previous, output) = {
            let mut patient = write(&partition.patient);
            let previous = patient.clone();
            match change(&mut patient) {
                Ok(output) => (previous, output),
                Err(e) => {
                    *patient = previous;
                    return Err(e);
                }
            }
        };

        if let Err(e) = self.persist_patients() {
            *write(&partition.patient) = previous;
            return Err(e);
        }
        Ok(output)
    }

    fn persist_patients(&self) -> Result<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        journal.save_patients(&self.patients())
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
