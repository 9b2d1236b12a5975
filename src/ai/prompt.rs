//! Prompt construction
//!
//! Only structured facts go into the prompt: the latest value per metric, the
//! classification and the triggered rule names. Patient names and any stored
//! free text stay out.

use crate::ai::client::AssistantPrompt;
use crate::ai::types::MetricSnapshot;
use crate::model::{ObservationValue, Severity};

const SYSTEM_PROMPT: &str = "You support family caregivers of elderly people. \
You receive structured readings that a rule engine has already classified. \
Reply with short, practical steps the caregiver can take now, in plain language, at most five sentences. \
Never name a disease or state a diagnosis. Never recommend changing medication or dosage. \
Always suggest contacting a healthcare professional when readings are concerning. \
Reply with plain text only.";

pub fn build_prompt(snapshot: &MetricSnapshot, classification: Severity, triggered_rules: &[String]) -> AssistantPrompt {
    let mut user = String::new();
    user.push_str(&format!("Classification: {}\n", classification));

    user.push_str("Triggered rules:");
    if triggered_rules.is_empty() {
        user.push_str(" none");
    }
    for rule in triggered_rules {
        user.push_str(&format!("\n- {}", rule));
    }

    user.push_str("\nLatest readings:");
    for reading in &snapshot.readings {
        let value = match reading.value {
            ObservationValue::Boolean(true) => "taken".to_string(),
            ObservationValue::Boolean(false) => "missed".to_string(),
            ObservationValue::Numeric(v) => format!("{} {}", v, reading.metric.unit()).trim_end().to_string(),
        };
        user.push_str(&format!(
            "\n- {}: {} at {}",
            reading.metric,
            value,
            reading.timestamp.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    user.push_str("\n\nWhat should the caregiver do next?");

    AssistantPrompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}
