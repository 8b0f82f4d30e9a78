//! Ollama generation backend for local runs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use chaincv_core::{defaults, Error, GenerationBackend, Result, SamplingOptions};

/// Ollama generation backend.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    gen_model: String,
    gen_timeout_secs: u64,
}

impl OllamaBackend {
    /// Create a backend with custom configuration.
    pub fn with_config(base_url: String, gen_model: String, gen_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(gen_timeout_secs))
            .build()?;

        info!(
            subsystem = "inference",
            component = "ollama",
            "Initializing Ollama backend: url={}, gen={}",
            base_url,
            gen_model
        );

        Ok(Self {
            client,
            base_url,
            gen_model,
            gen_timeout_secs,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let gen_model = std::env::var("OLLAMA_GEN_MODEL")
            .unwrap_or_else(|_| defaults::OLLAMA_GEN_MODEL.to_string());
        let gen_timeout = std::env::var("GEN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::GEN_TIMEOUT_SECS);

        Self::with_config(base_url, gen_model, gen_timeout)
    }
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    num_predict: u32,
}

/// Request payload for the Ollama `/api/chat` endpoint.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    /// `"json"` constrains output to valid JSON.
    format: serde_json::Value,
    /// Suppress chain-of-thought for models that support it.
    think: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    #[instrument(skip(self, prompt, options), fields(subsystem = "inference", component = "ollama", op = "generate", model = %self.gen_model, prompt_len = prompt.len()))]
    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String> {
        let start = Instant::now();

        let request = ChatRequest {
            model: self.gen_model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: false,
            format: serde_json::json!("json"),
            think: false,
            options: ChatOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                top_k: options.top_k,
                num_predict: options.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(self.gen_timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!(
                "Ollama returned {}: {}",
                status, body
            )));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("Failed to parse response: {}", e)))?;

        let content = result.message.content;
        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            response_len = content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30000 {
            warn!(
                duration_ms = elapsed,
                prompt_len = prompt.len(),
                slow = true,
                "Slow generation operation"
            );
        }
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.gen_model
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(true),
            Ok(resp) => {
                warn!("Ollama health check failed: {}", resp.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Ollama health check error: {}", e);
                Ok(false)
            }
        }
    }
}
