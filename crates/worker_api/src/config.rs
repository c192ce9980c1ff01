use std::time::Duration;

/// Transport configuration for worker API requests.
#[derive(Debug, Clone)]
pub struct WorkerApiConfig {
    /// Bearer token issued alongside the worker endpoint.
    pub token: String,
    /// Base URL for the worker service.
    pub base_url: String,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Optional timeout applied to non-streaming requests.
    pub timeout: Option<Duration>,
}

impl WorkerApiConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into(),
            user_agent: None,
            timeout: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
