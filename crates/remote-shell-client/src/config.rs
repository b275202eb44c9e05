//! Client configuration.

use std::time::Duration;

use remote_shell_core::{
    ConfigError, DEFAULT_TIMEOUT,
    config::{TIMEOUT_ENV, duration_ms_from_env},
};

/// Environment variable overriding the prompt text.
pub const PROMPT_ENV: &str = "REMOTE_SHELL_PROMPT";

/// Default prompt text.
pub const DEFAULT_PROMPT: &str = "remote> ";

/// Client session configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Liveness timeout for an in-flight command, also the bound on the
    /// interrupt-confirmation wait.
    pub timeout: Duration,
    /// Prompt shown while no command is in flight.
    pub prompt: String,
    /// Print the detail of remote failures, not just kind and message.
    pub show_error_detail: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            prompt: DEFAULT_PROMPT.to_string(),
            show_error_detail: false,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `REMOTE_SHELL_TIMEOUT_MS` and `REMOTE_SHELL_PROMPT`.
    ///
    /// # Errors
    /// Returns error if an override is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(timeout) = duration_ms_from_env(TIMEOUT_ENV)? {
            config.timeout = timeout;
        }
        if let Ok(prompt) = std::env::var(PROMPT_ENV) {
            config.prompt = prompt;
        }
        Ok(config)
    }

    /// Set the liveness timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the prompt text.
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Show remote failure details.
    #[must_use]
    pub const fn with_error_detail(mut self, show: bool) -> Self {
        self.show_error_detail = show;
        self
    }
}
