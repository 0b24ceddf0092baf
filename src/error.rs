//! Crate-wide error type.
//!
//! Variants fall into two groups: infrastructure errors (`Database`, `Io`,
//! `Serialization`, `Configuration`, ...) that can occur in any component,
//! and the protocol-level error kinds named in the tool loop / bridge design
//! (`DeviceNotConnected`, `Timeout`, `Stuck`, ...), which callers match on to
//! decide whether to retry, degrade, or surface a failure report.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// No live duplex session for this device or user.
    #[error("device not connected: {0}")]
    DeviceNotConnected(String),

    /// The targeted device lacks a required capability tag.
    #[error("capability missing: {0}")]
    CapabilityMissing(String),

    /// A bridge request's deadline elapsed before a response arrived.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The client's reply to a bridge request reported failure.
    #[error("client error: {0}")]
    ClientError(String),

    /// A tool call completed but reported failure; this is a first-class
    /// signal fed back into the tool loop, not a transport-level error.
    #[error("tool failed: {0}")]
    ToolFailure(String),

    /// Pattern-matched from a tool error (e.g. "no local-agent", "not
    /// connected"); short-circuits the active tool loop.
    #[error("infrastructure down: {0}")]
    InfrastructureDown(String),

    #[error("LLM rate limited: {0}")]
    LlmRateLimit(String),

    #[error("LLM authentication failed: {0}")]
    LlmAuth(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("failed to parse LLM response: {0}")]
    LlmParseFailure(String),

    /// Synthesized by the tool loop's own stuck detector.
    #[error("tool loop stuck: {0}")]
    Stuck(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a textual tool error the way the tool loop's error-taxonomy
    /// step does: infrastructure-loss phrases short-circuit the loop rather
    /// than being treated as an ordinary tool failure.
    pub fn from_tool_error(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("no local-agent") || lower.contains("not connected") || lower.contains("no device") {
            Error::InfrastructureDown(message)
        } else {
            Error::ToolFailure(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_phrases_classify_as_infrastructure_down() {
        assert!(matches!(
            Error::from_tool_error("no local-agent available"),
            Error::InfrastructureDown(_)
        ));
        assert!(matches!(
            Error::from_tool_error("client not connected"),
            Error::InfrastructureDown(_)
        ));
    }

    #[test]
    fn ordinary_failures_classify_as_tool_failure() {
        assert!(matches!(
            Error::from_tool_error("file not found"),
            Error::ToolFailure(_)
        ));
    }
}
