//! Process configuration.

use chaincv_core::defaults;

/// Which task queue the worker talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBackend {
    /// Remote Conductor server.
    Conductor,
    /// In-process queue, for local runs without a Conductor server.
    Memory,
}

/// Settings read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL URL. `None` (or `memory`) selects the in-memory store.
    pub database_url: Option<String>,
    /// Directory relative storage paths are read from by the worker.
    pub upload_dir: String,
    pub queue: QueueBackend,
    pub workflow_name: String,
    pub workflow_version: i32,
    pub default_owner: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            upload_dir: defaults::UPLOAD_DIR.to_string(),
            queue: QueueBackend::Conductor,
            workflow_name: defaults::WORKFLOW_NAME.to_string(),
            workflow_version: defaults::WORKFLOW_VERSION,
            default_owner: defaults::DEFAULT_OWNER.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | unset (in-memory store) |
    /// | `UPLOAD_DIR` | `uploads` |
    /// | `QUEUE_BACKEND` | `conductor` (`memory` for the in-process queue) |
    /// | `WORKFLOW_NAME` | `resume_analysis_workflow_v2` |
    /// | `WORKFLOW_VERSION` | `1` |
    /// | `DEFAULT_OWNER` | `default-user@example.com` |
    pub fn from_env() -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let base = Self::default();

        let database_url = non_empty("DATABASE_URL").filter(|url| url != "memory");
        let queue = match non_empty("QUEUE_BACKEND").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("memory") => QueueBackend::Memory,
            _ => QueueBackend::Conductor,
        };

        Self {
            database_url,
            upload_dir: non_empty("UPLOAD_DIR").unwrap_or(base.upload_dir),
            queue,
            workflow_name: non_empty("WORKFLOW_NAME").unwrap_or(base.workflow_name),
            workflow_version: non_empty("WORKFLOW_VERSION")
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.workflow_version),
            default_owner: non_empty("DEFAULT_OWNER").unwrap_or(base.default_owner),
        }
    }

    pub fn with_workflow(mut self, name: impl Into<String>, version: i32) -> Self {
        self.workflow_name = name.into();
        self.workflow_version = version;
        self
    }

    pub fn with_default_owner(mut self, owner: impl Into<String>) -> Self {
        self.default_owner = owner.into();
        self
    }
}
