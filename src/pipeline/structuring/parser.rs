use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::ollama_types::GenerationOptions;
use super::prompt::ASSISTANT_ACKNOWLEDGMENT;
use super::types::{ChatMessage, LlmClient};
use super::validation::EntryRejection;
use super::StructuringError;

// ═══════════════════════════════════════════════════════════════════════════
// Model invocation
// ═══════════════════════════════════════════════════════════════════════════

/// Sends prescription text to the LLM under a fixed instruction prompt.
pub struct StructuredParser {
    client: Arc<dyn LlmClient>,
    model: String,
    options: GenerationOptions,
}

impl StructuredParser {
    pub fn new(client: Arc<dyn LlmClient>, model: &str, options: GenerationOptions) -> Self {
        Self {
            client,
            model: model.to_string(),
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run the two-turn seed (instruction, acknowledgment) plus the text as
    /// the user turn. The reply is returned as-is; shape is not checked here.
    pub fn parse(&self, extracted_text: &str, prompt: &str) -> Result<String, StructuringError> {
        let _span = tracing::info_span!(
            "structured_parse",
            model = %self.model,
            text_len = extracted_text.len(),
        )
        .entered();
        let start = std::time::Instant::now();

        let messages = [
            ChatMessage::system(prompt),
            ChatMessage::assistant(ASSISTANT_ACKNOWLEDGMENT),
            ChatMessage::user(extracted_text),
        ];
        let reply = self.client.chat(&self.model, &messages, &self.options)?;

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            reply_len = reply.len(),
            "Structured parse complete"
        );
        Ok(reply)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Typed decoding of model output
// ═══════════════════════════════════════════════════════════════════════════

/// Why model output could not be used at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Not JSON.
    #[error("parsing failed: {0}")]
    Format(String),

    /// JSON, but without a usable `medicines` list.
    #[error("{0}")]
    Validation(String),
}

/// One medicine as the model described it. Missing fields decode as empty.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParsedMedicine {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub times: Vec<String>,
}

/// A medicine list item: decoded, or rejected for its shape.
pub type MedicineCandidate = Result<ParsedMedicine, EntryRejection>;

/// Model output after decoding.
///
/// `duration`, `advice` and `follow_up` are carried but not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrescription {
    pub medicines: Vec<MedicineCandidate>,
    pub duration: Option<String>,
    pub advice: Option<String>,
    pub follow_up: Option<String>,
}

/// Decode raw model output into a [`ParsedPrescription`].
///
/// A surrounding Markdown code fence is tolerated. Individual medicine
/// items that fail to decode are kept as rejected candidates.
pub fn parse_prescription(raw: &str) -> Result<ParsedPrescription, ParseFailure> {
    let json = strip_code_fence(raw);
    let value: Value =
        serde_json::from_str(json).map_err(|e| ParseFailure::Format(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ParseFailure::Validation("response is not a JSON object".into()))?;

    let items = match object.get("medicines") {
        None | Some(Value::Null) => {
            return Err(ParseFailure::Validation(
                "No medicines found in the parsed prescription data".into(),
            ))
        }
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ParseFailure::Validation(
                "\"medicines\" is not a list".into(),
            ))
        }
    };
    if items.is_empty() {
        return Err(ParseFailure::Validation(
            "No medicines found in the parsed prescription data".into(),
        ));
    }

    let medicines = items
        .iter()
        .map(|item| {
            ParsedMedicine::deserialize(item)
                .map_err(|e| EntryRejection::Malformed(e.to_string()))
        })
        .collect();

    Ok(ParsedPrescription {
        medicines,
        duration: optional_text(object.get("duration")),
        advice: optional_text(object.get("advice")),
        follow_up: optional_text(object.get("follow_up")),
    })
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Remove a ```` ```json ```` / ```` ``` ```` fence wrapping the whole reply.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
