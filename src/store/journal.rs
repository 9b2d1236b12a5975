//! On-disk persistence - append-only JSONL journals plus an atomically rewritten patient file

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::{CareNote, Observation, Patient};

const OBSERVATIONS_FILE: &str = "observations.jsonl";
const NOTES_FILE: &str = "notes.jsonl";
const PATIENTS_FILE: &str = "patients.json";

/// Journal rooted at a data directory
#[derive(Debug, Clone)]
pub struct Journal {
    dir: PathBuf,
}

impl Journal {
    /// Open (and create if missing) the data directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn observations_path(&self) -> PathBuf {
        self.dir.join(OBSERVATIONS_FILE)
    }

    pub fn notes_path(&self) -> PathBuf {
        self.dir.join(NOTES_FILE)
    }

    pub fn patients_path(&self) -> PathBuf {
        self.dir.join(PATIENTS_FILE)
    }

    /// Append one observation under an exclusive file lock
    pub fn append_observation(&self, observation: &Observation) -> Result<()> {
        append_line(&self.observations_path(), observation)
    }

    /// Replay the observation journal; malformed lines are skipped
    pub fn load_observations(&self) -> Result<Vec<Observation>> {
        load_lines(&self.observations_path())
    }

    pub fn append_note(&self, note: &CareNote) -> Result<()> {
        append_line(&self.notes_path(), note)
    }

    pub fn load_notes(&self) -> Result<Vec<CareNote>> {
        load_lines(&self.notes_path())
    }

    /// Rewrite the patient file via temp file + rename
    pub fn save_patients(&self, patients: &[Patient]) -> Result<()> {
        let path = self.patients_path();
        let temp = path.with_extension("tmp");
        fs::write(&temp, serde_json::to_string_pretty(patients)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    pub fn load_patients(&self) -> Result<Vec<Patient>> {
        let path = self.patients_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn append_line<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let line = serde_json::to_string(record)?;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    file.lock_exclusive()?;
    let mut file = file;
    let written = writeln!(file, "{}", line).and_then(|_| file.flush());
    file.unlock()?;
    written?;

    Ok(())
}

fn load_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path)?;
    file.lock_shared()?;
    let reader = BufReader::new(&file);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping malformed journal line"
            ),
        }
    }
    file.unlock()?;

    debug!(count = records.len(), path = %path.display(), "Replayed journal");
    Ok(records)
}
