//! Domain types - patients, metrics, observations and severity

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

// ============================================================================
// Metric
// ============================================================================

/// Tracked health metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    HeartRate,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    Temperature,
    Glucose,
    MedicationTaken,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::HeartRate,
        Metric::BloodPressureSystolic,
        Metric::BloodPressureDiastolic,
        Metric::Temperature,
        Metric::Glucose,
        Metric::MedicationTaken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::HeartRate => "heart_rate",
            Metric::BloodPressureSystolic => "blood_pressure_systolic",
            Metric::BloodPressureDiastolic => "blood_pressure_diastolic",
            Metric::Temperature => "temperature",
            Metric::Glucose => "glucose",
            Metric::MedicationTaken => "medication_taken",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::HeartRate => "bpm",
            Metric::BloodPressureSystolic | Metric::BloodPressureDiastolic => "mmHg",
            Metric::Temperature => "°C",
            Metric::Glucose => "mg/dL",
            Metric::MedicationTaken => "",
        }
    }

    /// `medication_taken` is the only boolean metric
    pub fn is_boolean(&self) -> bool {
        matches!(self, Metric::MedicationTaken)
    }

    /// Physically plausible range; anything outside is a data-entry error
    pub fn physical_range(&self) -> Option<(f64, f64)> {
        match self {
            Metric::HeartRate => Some((0.0, 300.0)),
            Metric::BloodPressureSystolic => Some((0.0, 300.0)),
            Metric::BloodPressureDiastolic => Some((0.0, 200.0)),
            Metric::Temperature => Some((25.0, 45.0)),
            Metric::Glucose => Some((0.0, 1000.0)),
            Metric::MedicationTaken => None,
        }
    }

    /// Rounding step used when comparing snapshots for the advisory cache
    pub fn snapshot_precision(&self) -> f64 {
        match self {
            Metric::Temperature => 0.1,
            _ => 1.0,
        }
    }

    /// Check that `value` has the right kind and lies in the physical range
    pub fn validate(&self, value: &ObservationValue) -> Result<(), ValidationError> {
        match (self.is_boolean(), value) {
            (true, ObservationValue::Boolean(_)) => Ok(()),
            (true, ObservationValue::Numeric(_)) => Err(ValidationError::WrongValueKind {
                metric: *self,
                expected: "boolean",
            }),
            (false, ObservationValue::Boolean(_)) => Err(ValidationError::WrongValueKind {
                metric: *self,
                expected: "numeric",
            }),
            (false, ObservationValue::Numeric(v)) => {
                let (min, max) = self.physical_range().unwrap_or((f64::MIN, f64::MAX));
                if !v.is_finite() || *v < min || *v > max {
                    return Err(ValidationError::OutOfRange {
                        metric: *self,
                        value: *v,
                        min,
                        max,
                    });
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = ValidationError;

    /// Case-insensitive; `-` and `_` are interchangeable
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Metric::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownMetric(s.to_string()))
    }
}

// ============================================================================
// ObservationValue / Observation
// ============================================================================

/// Reading value: numeric vitals or the boolean medication flag
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Boolean(bool),
    Numeric(f64),
}

impl ObservationValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObservationValue::Numeric(v) => Some(*v),
            ObservationValue::Boolean(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ObservationValue::Boolean(b) => Some(*b),
            ObservationValue::Numeric(_) => None,
        }
    }

    /// Parse a raw string for the given metric (`true`/`false`/`yes`/`no` for booleans)
    pub fn parse_for(metric: Metric, raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let unparseable = || ValidationError::Unparseable {
            metric,
            raw: raw.to_string(),
        };

        if metric.is_boolean() {
            match trimmed.to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(ObservationValue::Boolean(true)),
                "false" | "no" | "n" | "0" => Ok(ObservationValue::Boolean(false)),
                _ => Err(unparseable()),
            }
        } else {
            trimmed
                .parse::<f64>()
                .map(ObservationValue::Numeric)
                .map_err(|_| unparseable())
        }
    }
}

impl fmt::Display for ObservationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationValue::Boolean(b) => write!(f, "{}", b),
            ObservationValue::Numeric(v) => write!(f, "{}", v),
        }
    }
}

/// A single timestamped reading; immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub patient_id: String,
    pub metric: Metric,
    pub value: ObservationValue,
    pub timestamp: DateTime<Utc>,
    /// Caregiver remark; stored and shown, never sent to the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ============================================================================
// Thresholds
// ============================================================================

/// Normal band nested inside a wider emergency band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub low: f64,
    pub high: f64,
    pub emergency_low: f64,
    pub emergency_high: f64,
}

impl ThresholdBand {
    pub const fn new(low: f64, high: f64, emergency_low: f64, emergency_high: f64) -> Self {
        Self {
            low,
            high,
            emergency_low,
            emergency_high,
        }
    }

    /// Requires `emergency_low <= low <= high <= emergency_high`, all finite
    pub fn validate(&self, metric: Metric) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidBand {
            metric,
            reason: reason.to_string(),
        };

        if metric.is_boolean() {
            return Err(invalid("boolean metrics have no numeric band"));
        }
        let values = [self.emergency_low, self.low, self.high, self.emergency_high];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(invalid("bounds must be finite"));
        }
        if !values.windows(2).all(|w| w[0] <= w[1]) {
            return Err(invalid(
                "expected emergency_low <= low <= high <= emergency_high",
            ));
        }
        Ok(())
    }

    pub fn in_emergency(&self, value: f64) -> bool {
        value < self.emergency_low || value > self.emergency_high
    }
}

/// Per-patient threshold bands, keyed by metric
///
/// Deserializing a partial map fills the missing metrics with the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Metric, ThresholdBand>", into = "BTreeMap<Metric, ThresholdBand>")]
pub struct Thresholds {
    bands: BTreeMap<Metric, ThresholdBand>,
}

impl From<BTreeMap<Metric, ThresholdBand>> for Thresholds {
    fn from(overrides: BTreeMap<Metric, ThresholdBand>) -> Self {
        let mut thresholds = Thresholds::default();
        thresholds.bands.extend(overrides);
        thresholds
    }
}

impl From<Thresholds> for BTreeMap<Metric, ThresholdBand> {
    fn from(thresholds: Thresholds) -> Self {
        thresholds.bands
    }
}

impl Default for Thresholds {
    /// Illustrative adult defaults, not clinical guidance
    fn default() -> Self {
        let bands = BTreeMap::from([
            (Metric::HeartRate, ThresholdBand::new(60.0, 100.0, 40.0, 120.0)),
            (Metric::BloodPressureSystolic, ThresholdBand::new(90.0, 140.0, 70.0, 180.0)),
            (Metric::BloodPressureDiastolic, ThresholdBand::new(60.0, 90.0, 40.0, 120.0)),
            (Metric::Temperature, ThresholdBand::new(36.1, 37.8, 35.0, 39.5)),
            (Metric::Glucose, ThresholdBand::new(70.0, 160.0, 50.0, 180.0)),
        ]);
        Self { bands }
    }
}

impl Thresholds {
    pub fn band(&self, metric: Metric) -> Option<&ThresholdBand> {
        self.bands.get(&metric)
    }

    pub fn set(&mut self, metric: Metric, band: ThresholdBand) -> Result<(), ValidationError> {
        band.validate(metric)?;
        self.bands.insert(metric, band);
        Ok(())
    }

    pub fn with_band(mut self, metric: Metric, band: ThresholdBand) -> Result<Self, ValidationError> {
        self.set(metric, band)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.bands.iter().try_for_each(|(metric, band)| band.validate(*metric))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &ThresholdBand)> {
        self.bands.iter().map(|(m, b)| (*m, b))
    }
}

// ============================================================================
// Patient
// ============================================================================

/// Registered patient; never deleted, only archived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub display_name: String,
    pub thresholds: Thresholds,
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
}

impl Patient {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            thresholds,
            archived: false,
            created_at: Utc::now(),
            medications: Vec::new(),
            appointments: Vec::new(),
        }
    }
}

// ============================================================================
// Care records
// ============================================================================

/// A scheduled medication, e.g. "Lisinopril 10mg, daily 08:00"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub added_at: DateTime<Utc>,
}

impl fmt::Display for Medication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.name, self.dosage, self.schedule)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub doctor: String,
    pub date: NaiveDate,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Free-text caregiver note; private to the caregiver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareNote {
    pub id: String,
    pub patient_id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Trimmed, non-empty text or a `MissingField` error
pub fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value.to_string())
}

/// Trimmed text, `None` when blank
pub fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

// ============================================================================
// Severity
// ============================================================================

/// Rule-based classification, ordered `Normal < Watch < Urgent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Normal,
    Watch,
    Urgent,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "NORMAL",
            Severity::Watch => "WATCH",
            Severity::Urgent => "URGENT",
        }
    }

    /// WATCH and URGENT escalate to the assistant
    pub fn is_escalation(&self) -> bool {
        *self > Severity::Normal
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_from_str() {
        assert_eq!("heart_rate".parse::<Metric>(), Ok(Metric::HeartRate));
        assert_eq!("Blood-Pressure-Systolic".parse::<Metric>(), Ok(Metric::BloodPressureSystolic));
        assert_eq!(" glucose ".parse::<Metric>(), Ok(Metric::Glucose));
        assert_eq!(
            "weight".parse::<Metric>(),
            Err(ValidationError::UnknownMetric("weight".to_string()))
        );
    }

    #[test]
    fn test_metric_serde_names() {
        let json = serde_json::to_string(&Metric::MedicationTaken).unwrap();
        assert_eq!(json, "\"medication_taken\"");
        for metric in Metric::ALL {
            assert_eq!(metric.as_str().parse::<Metric>(), Ok(metric));
        }
    }

    #[test]
    fn test_validate_rejects_negative_heart_rate() {
        let err = Metric::HeartRate
            .validate(&ObservationValue::Numeric(-1.0))
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));
    }

    #[test]
    fn test_validate_rejects_nan() {
        assert!(Metric::Glucose.validate(&ObservationValue::Numeric(f64::NAN)).is_err());
        assert!(Metric::Temperature.validate(&ObservationValue::Numeric(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_validate_value_kind() {
        assert!(Metric::MedicationTaken.validate(&ObservationValue::Boolean(false)).is_ok());
        assert_eq!(
            Metric::MedicationTaken.validate(&ObservationValue::Numeric(1.0)),
            Err(ValidationError::WrongValueKind {
                metric: Metric::MedicationTaken,
                expected: "boolean"
            })
        );
        assert!(Metric::HeartRate.validate(&ObservationValue::Boolean(true)).is_err());
    }

    #[test]
    fn test_parse_value_for_metric() {
        assert_eq!(
            ObservationValue::parse_for(Metric::MedicationTaken, "No"),
            Ok(ObservationValue::Boolean(false))
        );
        assert_eq!(
            ObservationValue::parse_for(Metric::Temperature, "37.2"),
            Ok(ObservationValue::Numeric(37.2))
        );
        assert!(ObservationValue::parse_for(Metric::HeartRate, "fast").is_err());
    }

    #[test]
    fn test_observation_value_untagged_serde() {
        let b: ObservationValue = serde_json::from_str("false").unwrap();
        assert_eq!(b, ObservationValue::Boolean(false));
        let n: ObservationValue = serde_json::from_str("72").unwrap();
        assert_eq!(n, ObservationValue::Numeric(72.0));
    }

    #[test]
    fn test_band_validation() {
        let band = ThresholdBand::new(60.0, 100.0, 40.0, 120.0);
        assert!(band.validate(Metric::HeartRate).is_ok());

        let inverted = ThresholdBand::new(100.0, 60.0, 40.0, 120.0);
        assert!(inverted.validate(Metric::HeartRate).is_err());

        let narrow_emergency = ThresholdBand::new(60.0, 100.0, 65.0, 120.0);
        assert!(narrow_emergency.validate(Metric::HeartRate).is_err());

        assert!(band.validate(Metric::MedicationTaken).is_err());
    }

    #[test]
    fn test_default_thresholds_are_valid() {
        let thresholds = Thresholds::default();
        assert!(thresholds.validate().is_ok());
        assert!(thresholds.band(Metric::MedicationTaken).is_none());
        assert_eq!(thresholds.iter().count(), 5);
    }

    #[test]
    fn test_partial_thresholds_fill_defaults() {
        let thresholds: Thresholds = serde_json::from_str(
            r#"{"heart_rate": {"low": 55, "high": 95, "emergency_low": 40, "emergency_high": 125}}"#,
        )
        .unwrap();
        assert_eq!(thresholds.band(Metric::HeartRate).unwrap().low, 55.0);
        assert_eq!(
            thresholds.band(Metric::Glucose),
            Thresholds::default().band(Metric::Glucose)
        );
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Normal < Severity::Watch);
        assert!(Severity::Watch < Severity::Urgent);
        assert_eq!(
            [Severity::Watch, Severity::Urgent, Severity::Normal].iter().max(),
            Some(&Severity::Urgent)
        );
        assert!(!Severity::Normal.is_escalation());
        assert!(Severity::Watch.is_escalation());
    }

    #[test]
    fn test_severity_serde() {
        assert_eq!(serde_json::to_string(&Severity::Urgent).unwrap(), "\"URGENT\"");
        assert_eq!(format!("{}", Severity::Watch), "WATCH");
    }

    #[test]
    fn test_patient_without_care_records_loads() {
        let patient: Patient = serde_json::from_str(
            r#"{"id": "p1", "display_name": "Ada", "thresholds": {}, "created_at": "2026-03-01T08:00:00Z"}"#,
        )
        .unwrap();
        assert!(patient.medications.is_empty());
        assert!(patient.appointments.is_empty());
        assert!(!patient.archived);
    }

    #[test]
    fn test_observation_note_is_optional() {
        let json = r#"{"id": "o1", "patient_id": "p1", "metric": "glucose", "value": 110.0, "timestamp": "2026-03-01T08:00:00Z"}"#;
        let observation: Observation = serde_json::from_str(json).unwrap();
        assert!(observation.note.is_none());
        assert!(!serde_json::to_string(&observation).unwrap().contains("note"));
    }

    #[test]
    fn test_required_and_optional_text() {
        assert_eq!(required("title", "  Fall  "), Ok("Fall".to_string()));
        assert_eq!(required("title", " "), Err(ValidationError::MissingField("title")));
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" after meals ")), Some("after meals".to_string()));
    }
}
