//! Server configuration.

use std::time::Duration;

use remote_shell_core::{ConfigError, config::duration_ms_from_env};

/// Environment variable overriding the interrupt grace period, in milliseconds.
pub const INTERRUPT_GRACE_ENV: &str = "REMOTE_SHELL_INTERRUPT_GRACE_MS";

/// Default time a handler gets to honour a graceful interrupt.
pub const DEFAULT_INTERRUPT_GRACE: Duration = Duration::from_secs(5);

/// Default confirmation question; `{command}` is replaced by the command line.
pub const DEFAULT_CONFIRM_SUBJECT: &str = "Are you sure you want to cancel '{command}'? (y|n)";

/// Per-session dispatch configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How long a handler may keep running after a graceful interrupt
    /// before it is aborted.
    pub interrupt_grace: Duration,
    /// Template of the interrupt confirmation question.
    pub confirm_subject: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            interrupt_grace: DEFAULT_INTERRUPT_GRACE,
            confirm_subject: DEFAULT_CONFIRM_SUBJECT.to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `REMOTE_SHELL_INTERRUPT_GRACE_MS`.
    ///
    /// # Errors
    /// Returns error if the override is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(grace) = duration_ms_from_env(INTERRUPT_GRACE_ENV)? {
            config.interrupt_grace = grace;
        }
        Ok(config)
    }

    /// Set the interrupt grace period.
    #[must_use]
    pub const fn with_interrupt_grace(mut self, grace: Duration) -> Self {
        self.interrupt_grace = grace;
        self
    }

    /// Set the confirmation question template.
    #[must_use]
    pub fn with_confirm_subject(mut self, template: impl Into<String>) -> Self {
        self.confirm_subject = template.into();
        self
    }

    /// Confirmation question for a command line.
    #[must_use]
    pub fn confirm_subject_for(&self, line: &str) -> String {
        self.confirm_subject.replace("{command}", line)
    }
}
