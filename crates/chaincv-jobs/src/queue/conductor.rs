//! Conductor (Orkes) REST client.
//!
//! Authentication exchanges a key id/secret pair for a token at
//! `POST {server}/token`. The token is sent as `X-Authorization`, cached, and
//! refreshed once when a request comes back `401`. Without credentials the
//! client talks to an unauthenticated server (local Conductor OSS).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use chaincv_core::{defaults, Error, Result, Task, TaskQueue, TaskUpdate};

/// Connection settings for the Conductor server.
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    /// Base URL including the `/api` prefix.
    pub server_url: String,
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub timeout_secs: u64,
    /// How long the server may hold a batch poll open.
    pub poll_wait_ms: u64,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            server_url: defaults::ORKES_SERVER_URL.to_string(),
            key_id: None,
            key_secret: None,
            timeout_secs: defaults::QUEUE_REQUEST_TIMEOUT_SECS,
            poll_wait_ms: defaults::QUEUE_POLL_WAIT_MS,
        }
    }
}

impl ConductorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ORKES_SERVER_URL` | `http://localhost:8080/api` |
    /// | `ORKES_KEY_ID` | unset |
    /// | `ORKES_KEY_SECRET` | unset |
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            server_url: non_empty("ORKES_SERVER_URL")
                .unwrap_or_else(|| defaults::ORKES_SERVER_URL.to_string()),
            key_id: non_empty("ORKES_KEY_ID"),
            key_secret: non_empty("ORKES_KEY_SECRET"),
            ..Self::default()
        }
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    pub fn with_credentials(mut self, key_id: impl Into<String>, secret: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self.key_secret = Some(secret.into());
        self
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        Some((self.key_id.as_deref()?, self.key_secret.as_deref()?))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    key_id: &'a str,
    key_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Conductor task queue client.
pub struct ConductorClient {
    client: Client,
    config: ConductorConfig,
    token: RwLock<Option<String>>,
}

fn queue_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::Queue(format!("{}: {}", context, e))
}

impl ConductorClient {
    pub fn new(config: ConductorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        info!(
            subsystem = "jobs",
            component = "conductor",
            server_url = %config.server_url,
            authenticated = config.credentials().is_some(),
            "Initializing Conductor client"
        );
        Ok(Self {
            client,
            config,
            token: RwLock::new(None),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ConductorConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server_url.trim_end_matches('/'), path)
    }

    async fn fetch_token(&self, key_id: &str, key_secret: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/token"))
            .json(&TokenRequest { key_id, key_secret })
            .send()
            .await
            .map_err(|e| queue_err("Token request failed", e))?;
        if !response.status().is_success() {
            return Err(Error::Queue(format!(
                "Token request returned {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| queue_err("Failed to parse token response", e))?;
        debug!("Obtained Conductor access token");
        Ok(body.token)
    }

    /// Cached token, fetched on first use. `None` without credentials.
    async fn token(&self, refresh: bool) -> Result<Option<String>> {
        let Some((key_id, key_secret)) = self.config.credentials() else {
            return Ok(None);
        };
        if !refresh {
            if let Some(token) = self.token.read().await.clone() {
                return Ok(Some(token));
            }
        }
        let mut guard = self.token.write().await;
        let token = self.fetch_token(key_id, key_secret).await?;
        *guard = Some(token.clone());
        Ok(Some(token))
    }

    /// Send an authenticated request, refreshing the token once on `401`.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut refreshed = false;
        loop {
            let mut request = build(&self.client);
            if let Some(token) = self.token(refreshed).await? {
                request = request.header("X-Authorization", token);
            }
            let response = request
                .send()
                .await
                .map_err(|e| queue_err("Request failed", e))?;

            if response.status() == StatusCode::UNAUTHORIZED
                && !refreshed
                && self.config.credentials().is_some()
            {
                warn!("Conductor rejected token, refreshing");
                refreshed = true;
                continue;
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Queue(format!(
                    "Conductor returned {}: {}",
                    status, body
                )));
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl TaskQueue for ConductorClient {
    #[instrument(skip(self), fields(subsystem = "jobs", component = "conductor"))]
    async fn poll(&self, task_type: &str, worker_id: &str, count: usize) -> Result<Vec<Task>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let url = self.url(&format!("/tasks/poll/batch/{}", task_type));
        let count = count.to_string();
        let timeout = self.config.poll_wait_ms.to_string();
        let response = self
            .send(|client| {
                client.get(&url).query(&[
                    ("workerid", worker_id),
                    ("count", count.as_str()),
                    ("timeout", timeout.as_str()),
                ])
            })
            .await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let body = response
            .text()
            .await
            .map_err(|e| queue_err("Failed to read poll response", e))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let tasks: Vec<Task> =
            serde_json::from_str(&body).map_err(|e| queue_err("Failed to parse polled tasks", e))?;
        if !tasks.is_empty() {
            debug!(leased = tasks.len(), "Leased tasks");
        }
        Ok(tasks)
    }

    #[instrument(skip(self, update), fields(subsystem = "jobs", component = "conductor", task_id = %update.task_id, status = ?update.status))]
    async fn update(&self, update: TaskUpdate) -> Result<()> {
        let url = self.url("/tasks");
        self.send(|client| client.post(&url).json(&update)).await?;
        Ok(())
    }

    #[instrument(skip(self, input), fields(subsystem = "jobs", component = "conductor"))]
    async fn start_workflow(&self, name: &str, version: i32, input: JsonValue) -> Result<String> {
        let url = self.url(&format!("/workflow/{}", name));
        let version = version.to_string();
        let response = self
            .send(|client| {
                client
                    .post(&url)
                    .query(&[("version", version.as_str())])
                    .json(&input)
            })
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| queue_err("Failed to read workflow response", e))?;
        let workflow_id = body.trim().trim_matches('"').to_string();
        if workflow_id.is_empty() {
            return Err(Error::Queue("Conductor returned an empty workflow id".to_string()));
        }
        info!(workflow_id = %workflow_id, "Workflow started");
        Ok(workflow_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConductorConfig::default();
        assert_eq!(config.server_url, "http://localhost:8080/api");
        assert!(config.credentials().is_none());
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let mut config = ConductorConfig::default();
        config.key_id = Some("id".to_string());
        assert!(config.credentials().is_none());
        let config = config.with_credentials("id", "secret");
        assert_eq!(config.credentials(), Some(("id", "secret")));
    }

    #[test]
    fn test_url_joins_trailing_slash() {
        let client =
            ConductorClient::new(ConductorConfig::default().with_server_url("http://q:8080/api/"))
                .unwrap();
        assert_eq!(client.url("/tasks"), "http://q:8080/api/tasks");
    }

    #[test]
    fn test_token_request_shape() {
        let v = serde_json::to_value(TokenRequest {
            key_id: "k",
            key_secret: "s",
        })
        .unwrap();
        assert_eq!(v, serde_json::json!({"keyId": "k", "keySecret": "s"}));
    }
}
