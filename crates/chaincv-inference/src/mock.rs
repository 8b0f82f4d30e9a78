//! Mock generation backend for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chaincv_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_response(r#"{"summary":"s","strengths":["a"],"suggestion":"t","overallScore":80}"#)
//!     .with_failure("quota exceeded");
//! ```
//!
//! Queued replies are consumed in order; once the queue is empty every call
//! returns the default reply.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use chaincv_core::{Error, GenerationBackend, Result, SamplingOptions};

/// Default reply: a valid analysis object.
pub const DEFAULT_MOCK_RESPONSE: &str = r#"{"summary": "Experienced engineer with a track record of shipping backend systems.", "strengths": ["Systems design", "Rust", "Mentoring"], "suggestion": "Quantify the impact of recent projects.", "overallScore": 82}"#;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// A recorded call to the mock.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub prompt: String,
    pub options: SamplingOptions,
}

/// Mock generation backend.
#[derive(Clone)]
pub struct MockGenerationBackend {
    queue: Arc<Mutex<VecDeque<Reply>>>,
    default_reply: Arc<Reply>,
    latency: Duration,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            default_reply: Arc::new(Reply::Text(DEFAULT_MOCK_RESPONSE.to_string())),
            latency: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful reply.
    pub fn with_response(self, text: impl Into<String>) -> Self {
        lock(&self.queue).push_back(Reply::Text(text.into()));
        self
    }

    /// Queue a backend failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        lock(&self.queue).push_back(Reply::Fail(message.into()));
        self
    }

    /// Reply returned once the queue is drained.
    pub fn with_default_response(mut self, text: impl Into<String>) -> Self {
        self.default_reply = Arc::new(Reply::Text(text.into()));
        self
    }

    /// Make every call fail once the queue is drained.
    pub fn always_failing(mut self, message: impl Into<String>) -> Self {
        self.default_reply = Arc::new(Reply::Fail(message.into()));
        self
    }

    /// Simulated latency per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }
}

impl Default for MockGenerationBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str, options: &SamplingOptions) -> Result<String> {
        lock(&self.calls).push(MockCall {
            prompt: prompt.to_string(),
            options: *options,
        });
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let reply = lock(&self.queue)
            .pop_front()
            .unwrap_or_else(|| (*self.default_reply).clone());
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail(message) => Err(Error::Inference(message)),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_then_default() {
        let backend = MockGenerationBackend::new()
            .with_response("first")
            .with_failure("down");
        let opts = SamplingOptions::default();

        assert_eq!(backend.generate("p1", &opts).await.unwrap(), "first");
        assert!(matches!(
            backend.generate("p2", &opts).await,
            Err(Error::Inference(_))
        ));
        assert_eq!(
            backend.generate("p3", &opts).await.unwrap(),
            DEFAULT_MOCK_RESPONSE
        );

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1].prompt, "p2");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = MockGenerationBackend::new().always_failing("nope");
        let clone = backend.clone();
        assert!(clone
            .generate("x", &SamplingOptions::default())
            .await
            .is_err());
        assert_eq!(backend.call_count(), 1);
    }
}
