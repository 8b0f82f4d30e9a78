//! Structured résumé analysis on top of a generation backend.
//!
//! The model is asked for a strict four-key JSON object. Its reply is not
//! trusted: the JSON span is isolated with [`crate::json_extract`], parsed,
//! checked for the required keys, then checked for value types and ranges.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info, instrument, warn};

use chaincv_core::defaults::{ANALYSIS_MAX_INPUT_CHARS, SCORE_MAX, SCORE_MIN};
use chaincv_core::{
    AnalysisPayload, Error, GenerationBackend, Result, SamplingOptions, ANALYSIS_FIELDS,
};

use crate::json_extract::isolate_json_object;

/// Build the analysis prompt for (already truncated) document text.
pub fn build_prompt(text: &str) -> String {
    format!(
        r#"
You are an expert career coach. Analyze the following resume text.

CRITICAL INSTRUCTIONS:
1. Respond ONLY with a JSON object, no extra text, markdown, or emojis.
2. The JSON must have EXACT keys and structure:

{{
  "summary": "concise professional summary in 2-3 sentences",
  "strengths": ["strength1", "strength2", "strength3", "strength4"],
  "suggestion": "one actionable suggestion for improvement",
  "overallScore": 85
}}

Resume Text:
---
{}
---
"#,
        text
    )
}

/// First `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Turn a raw model response into a validated payload.
pub fn parse_analysis_response(raw: &str) -> Result<AnalysisPayload> {
    let span = isolate_json_object(raw)
        .ok_or_else(|| Error::Analysis("no JSON object found in model response".to_string()))?;

    let value: JsonValue = serde_json::from_str(span)
        .map_err(|e| Error::Analysis(format!("invalid JSON in model response: {}", e)))?;

    let object = value
        .as_object()
        .ok_or_else(|| Error::Analysis("model response is not a JSON object".to_string()))?;

    let missing: Vec<&str> = ANALYSIS_FIELDS
        .iter()
        .copied()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(Error::Analysis(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    validate_fields(object)
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::Analysis(format!("Invalid field {}: {}", field, reason))
}

fn non_empty_string(object: &Map<String, JsonValue>, field: &str) -> Result<String> {
    match object.get(field) {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        Some(JsonValue::String(_)) => Err(invalid(field, "must not be empty")),
        _ => Err(invalid(field, "must be a string")),
    }
}

fn validate_fields(object: &Map<String, JsonValue>) -> Result<AnalysisPayload> {
    let summary = non_empty_string(object, "summary")?;
    let suggestion = non_empty_string(object, "suggestion")?;

    let strengths = match object.get("strengths") {
        Some(JsonValue::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                JsonValue::String(s) if !s.trim().is_empty() => Ok(s.clone()),
                _ => Err(invalid("strengths", "entries must be non-empty strings")),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(JsonValue::Array(_)) => return Err(invalid("strengths", "must not be empty")),
        _ => return Err(invalid("strengths", "must be a list")),
    };

    let overall_score = match object.get("overallScore") {
        Some(JsonValue::Number(n)) => n.clone(),
        _ => return Err(invalid("overallScore", "must be a number")),
    };
    let score = overall_score.as_f64().unwrap_or(f64::NAN);
    if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(invalid(
            "overallScore",
            &format!("{} is outside {}..={}", score, SCORE_MIN, SCORE_MAX),
        ));
    }

    Ok(AnalysisPayload {
        summary,
        strengths,
        suggestion,
        overall_score,
    })
}

/// Client that turns document text into a validated [`AnalysisPayload`].
#[derive(Clone)]
pub struct AnalysisClient {
    backend: Arc<dyn GenerationBackend>,
    options: SamplingOptions,
    max_input_chars: usize,
}

impl AnalysisClient {
    /// Create a client with deterministic sampling and the default input cap.
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            options: SamplingOptions::deterministic(),
            max_input_chars: ANALYSIS_MAX_INPUT_CHARS,
        }
    }

    /// Override the input character cap.
    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    /// Model name of the underlying backend.
    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Analyze document text.
    ///
    /// Oversized text is truncated, never rejected. Backend failures and
    /// unusable responses are reported as `Error::Analysis`.
    #[instrument(skip_all, fields(subsystem = "inference", component = "analyzer", model = %self.backend.model_name()))]
    pub async fn analyze(&self, text: &str) -> Result<AnalysisPayload> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Analysis(
                "resume text is required for analysis".to_string(),
            ));
        }

        let input = truncate_chars(text, self.max_input_chars);
        if input.len() < text.len() {
            debug!(
                text_len = text.chars().count(),
                max_chars = self.max_input_chars,
                "Truncating analysis input"
            );
        }

        let start = Instant::now();
        let prompt = build_prompt(input);
        let raw = self
            .backend
            .generate(&prompt, &self.options)
            .await
            .map_err(|e| {
                warn!(error = %e, "Generation backend failed");
                Error::Analysis(e.to_string())
            })?;

        debug!(response_len = raw.len(), "Received model response");

        let payload = parse_analysis_response(&raw).inspect_err(|e| {
            warn!(error = %e, response_len = raw.len(), "Model response rejected");
        })?;

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            score = payload.score(),
            "AI analysis successful"
        );
        Ok(payload)
    }
}
