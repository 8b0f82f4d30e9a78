//! Google Gemini generation backend (`generateContent` REST API).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use chaincv_core::{defaults, Error, GenerationBackend, Result, SamplingOptions};

/// Connection settings for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Checked when a request is made, not at construction.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl GeminiConfig {
    /// Config with default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: defaults::GEMINI_URL.to_string(),
            model: defaults::GEMINI_MODEL.to_string(),
            timeout_secs: defaults::GEN_TIMEOUT_SECS,
        }
    }

    /// Load from environment variables.
    ///
    /// Reads `GEMINI_API_KEY`, `GEMINI_BASE_URL`, `GEMINI_MODEL` and
    /// `GEN_TIMEOUT_SECS`. A missing key only fails once a request is made.
    pub fn from_env() -> Self {
        let mut config = Self::new(String::new());
        config.api_key = std::env::var("GEMINI_API_KEY").ok();
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            config.model = model;
        }
        if let Some(secs) = std::env::var("GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.timeout_secs = secs;
        }
        config
    }

    /// The API key, or a configuration error when unset or blank.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("GEMINI_API_KEY is not set".to_string()))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Gemini generation backend.
pub struct GeminiBackend {
    client: Client,
    config: GeminiConfig,
}

impl GeminiBackend {
    /// Create a backend.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.require_api_key().is_err() {
            warn!(
                subsystem = "inference",
                component = "gemini",
                "GEMINI_API_KEY is not set; analysis requests will fail"
            );
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!(
            subsystem = "inference",
            component = "gemini",
            model = %config.model,
            "Initializing Gemini backend"
        );
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl From<&SamplingOptions> for GenerationConfig {
    fn from(o: &SamplingOptions) -> Self {
        Self {
            temperature: o.temperature,
            top_p: o.top_p,
            top_k: o.top_k,
            max_output_tokens: o.max_output_tokens,
        }
    }
}

/// Request payload for `models/{model}:generateContent`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    #[instrument(skip(self, prompt, options), fields(subsystem = "inference", component = "gemini", op = "generate", model = %self.config.model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String> {
        let api_key = self.config.require_api_key()?;
        let start = Instant::now();
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: options.into(),
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Gemini returned {}: {}",
                status, body
            )));
        }

        let result: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let text = result
            .text()
            .ok_or_else(|| Error::Inference("Gemini returned no candidate text".to_string()))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = text.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(duration_ms = elapsed, slow = true, "Slow generation operation");
        }
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
