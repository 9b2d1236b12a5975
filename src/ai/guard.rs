//! Response guard - validates and normalizes assistant output before a caregiver sees it
//!
//! Rejected outright:
//! - empty output
//! - output longer than the configured maximum
//! - output asserting a named disease (a diagnosis the tool must never surface)

use regex::Regex;
use tracing::warn;

use crate::error::AssistantError;
use crate::model::Severity;

/// Attached to every advisory
pub const NOT_A_DIAGNOSIS: &str = "This is not a diagnosis.";

/// Shown instead of a rejected assistant response
pub const CONSULT_PROFESSIONAL: &str =
    "Guidance is unavailable for these readings. Please consult a healthcare professional.";

pub const URGENT_CAVEAT: &str =
    "Readings are in an urgent range. Contact a healthcare professional or emergency services promptly.";

pub const MEDICATION_CAVEAT: &str =
    "Do not change medication or dosage without talking to the prescriber.";

const CONDITIONS: &str = r"diabetes|hypertension|hypotension|heart failure|heart attack|myocardial infarction|stroke|pneumonia|sepsis|dementia|alzheimer'?s|parkinson'?s|atrial fibrillation|arrhythmia|(?:urinary tract |respiratory )?infection|cancer|kidney (?:disease|failure)|copd|hypoglycemia|hyperglycemia|covid(?:-19)?";

pub struct ResponseGuard {
    max_length: usize,
    diagnostic_patterns: Vec<Regex>,
    medication_change: Regex,
}

impl ResponseGuard {
    pub fn new(max_length: usize) -> Self {
        let subjects = r"you|he|she|they|the patient|your (?:mother|father|parent|grandmother|grandfather|loved one)";
        let diagnostic_patterns = vec![
            // "the patient has pneumonia", "she is likely suffering from a stroke"
            Regex::new(&format!(
                r"(?i)\b(?:{subjects})\s+(?:(?:is|are|has|have)\s+)?(?:(?:probably|likely|clearly|definitely)\s+)?(?:has|have|having|suffering from|developed|may have|might have)\s+(?:an?\s+)?(?:early[- ]stage\s+)?(?:{CONDITIONS})\b"
            ))
            .expect("diagnostic subject pattern"),
            // "this is a heart attack", "these readings indicate sepsis"
            Regex::new(&format!(
                r"(?i)\b(?:this|these readings|the readings)\s+(?:is|are|indicates?|confirms?|means)\s+(?:an?\s+)?(?:{CONDITIONS})\b"
            ))
            .expect("diagnostic reading pattern"),
            Regex::new(&format!(
                r"(?i)\b(?:diagnosed with|diagnosis (?:is|of))\s+(?:an?\s+)?(?:{CONDITIONS})\b"
            ))
            .expect("diagnosis pattern"),
        ];
        let medication_change = Regex::new(
            r"(?i)\b(?:increase|decrease|double|halve|skip|stop|reduce|adjust)\b[^.\n]{0,40}\b(?:dose|dosage|medication|medicine|insulin|pills?|tablets?)\b",
        )
        .expect("medication change pattern");

        Self {
            max_length,
            diagnostic_patterns,
            medication_change,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Normalize `raw` and reject anything unsafe or malformed
    pub fn check(&self, raw: &str) -> Result<String, AssistantError> {
        let text = normalize(raw);

        if text.is_empty() {
            return Err(AssistantError::ResponseInvalid("empty response".to_string()));
        }

        let length = text.chars().count();
        if length > self.max_length {
            return Err(AssistantError::ResponseInvalid(format!(
                "response length {} exceeds maximum {}",
                length, self.max_length
            )));
        }

        if let Some(claim) = self.diagnostic_claim(&text) {
            warn!(claim = %claim, "Assistant response contains a diagnostic claim");
            return Err(AssistantError::ResponseInvalid(
                "response contains a diagnostic claim".to_string(),
            ));
        }

        Ok(text)
    }

    /// Caveats for accepted guidance
    pub fn caveats(&self, classification: Severity, guidance: &str) -> Vec<String> {
        let mut caveats = vec![NOT_A_DIAGNOSIS.to_string()];
        if classification == Severity::Urgent {
            caveats.push(URGENT_CAVEAT.to_string());
        }
        if self.medication_change.is_match(guidance) {
            caveats.push(MEDICATION_CAVEAT.to_string());
        }
        caveats
    }

    fn diagnostic_claim<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.diagnostic_patterns
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str())
    }
}

/// Strip control characters, trailing spaces and runs of blank lines
fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| *c == '\n' || !c.is_control())
        .collect();

    let mut lines: Vec<&str> = Vec::new();
    for line in cleaned.lines().map(str::trim_end) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}
