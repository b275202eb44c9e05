//! Configuration helpers shared by client and server.

use std::time::Duration;

use thiserror::Error;

/// Default liveness timeout and interrupt-confirmation wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding the liveness timeout, in milliseconds.
pub const TIMEOUT_ENV: &str = "REMOTE_SHELL_TIMEOUT_MS";

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Read a millisecond duration from the environment.
///
/// Returns `Ok(None)` when the variable is unset or empty.
///
/// # Errors
/// Returns error if the variable is set but is not a positive integer.
pub fn duration_ms_from_env(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => parse_duration_ms(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

/// Parse a positive millisecond count.
///
/// # Errors
/// Returns error if `raw` is not a positive integer.
pub fn parse_duration_ms(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
        reason: reason.to_string(),
    };
    let millis: u64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid("expected milliseconds"))?;
    if millis == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}
