//! Runtime configuration, loaded from environment variables (with `.env`
//! support). Every field has a sane default so a bare `Config::from_env()`
//! works for local development.

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_host: String,
    pub bind_port: u16,
    pub llm_base_url: String,
    pub llm_secret: String,
    pub model_fast: String,
    pub model_workhorse: String,
    pub model_architect: String,
    pub tool_timeout_secs: u64,
    pub bridge_request_timeout_secs: u64,
    pub max_tool_loop_iterations: u32,
    pub workspace_cleanup_after_hours: i64,
    pub dead_agent_scan_interval_secs: u64,
    pub rate_limit_max_failures: u32,
    pub rate_limit_window_secs: i64,
    pub encryption_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://conduit.db".to_string(),
            bind_host: "0.0.0.0".to_string(),
            bind_port: 7420,
            llm_base_url: "http://localhost:9002".to_string(),
            llm_secret: String::new(),
            model_fast: "gpt-4o-mini".to_string(),
            model_workhorse: "gpt-4o".to_string(),
            model_architect: "o1".to_string(),
            tool_timeout_secs: 30,
            bridge_request_timeout_secs: 30,
            max_tool_loop_iterations: 25,
            workspace_cleanup_after_hours: 24,
            dead_agent_scan_interval_secs: 600,
            rate_limit_max_failures: 3,
            rate_limit_window_secs: 900,
            encryption_key: None,
        }
    }
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset. Does not itself load a `.env` file; callers load
    /// one at process start (see `main.rs`), matching the reference
    /// crate's `dotenv::dotenv()` call before any config is read.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let bind_port = match std::env::var("CONDUIT_BIND_PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| Error::Configuration(format!("CONDUIT_BIND_PORT is not a valid port: {v}")))?,
            Err(_) => defaults.bind_port,
        };

        let llm_secret = std::env::var("TOLLBOOTH_INTERNAL_SECRET")
            .or_else(|_| std::env::var("CONDUIT_LLM_SECRET"))
            .unwrap_or_default();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_host: std::env::var("CONDUIT_BIND_HOST").unwrap_or(defaults.bind_host),
            bind_port,
            llm_base_url: std::env::var("TOLLBOOTH_URL")
                .or_else(|_| std::env::var("CONDUIT_LLM_BASE_URL"))
                .unwrap_or(defaults.llm_base_url),
            llm_secret,
            model_fast: std::env::var("CONDUIT_MODEL_FAST").unwrap_or(defaults.model_fast),
            model_workhorse: std::env::var("CONDUIT_MODEL_WORKHORSE").unwrap_or(defaults.model_workhorse),
            model_architect: std::env::var("CONDUIT_MODEL_ARCHITECT").unwrap_or(defaults.model_architect),
            tool_timeout_secs: env_u64("CONDUIT_TOOL_TIMEOUT_SECS", defaults.tool_timeout_secs)?,
            bridge_request_timeout_secs: env_u64(
                "CONDUIT_BRIDGE_REQUEST_TIMEOUT_SECS",
                defaults.bridge_request_timeout_secs,
            )?,
            max_tool_loop_iterations: env_u32(
                "CONDUIT_MAX_TOOL_LOOP_ITERATIONS",
                defaults.max_tool_loop_iterations,
            )?,
            workspace_cleanup_after_hours: env_i64(
                "CONDUIT_WORKSPACE_CLEANUP_AFTER_HOURS",
                defaults.workspace_cleanup_after_hours,
            )?,
            dead_agent_scan_interval_secs: env_u64(
                "CONDUIT_DEAD_AGENT_SCAN_INTERVAL_SECS",
                defaults.dead_agent_scan_interval_secs,
            )?,
            rate_limit_max_failures: env_u32("CONDUIT_RATE_LIMIT_MAX_FAILURES", defaults.rate_limit_max_failures)?,
            rate_limit_window_secs: env_i64(
                "CONDUIT_RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )?,
            encryption_key: std::env::var("CONDUIT_ENCRYPTION_KEY").ok(),
        })
    }
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::Configuration(format!("{key} is not a valid number: {v}"))),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::Configuration(format!("{key} is not a valid number: {v}"))),
        Err(_) => Ok(default),
    }
}

fn env_i64(key: &str, default: i64) -> Result<i64> {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|_| Error::Configuration(format!("{key} is not a valid number: {v}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_numbers() {
        let c = Config::default();
        assert_eq!(c.workspace_cleanup_after_hours, 24);
        assert_eq!(c.dead_agent_scan_interval_secs, 600);
        assert_eq!(c.rate_limit_max_failures, 3);
        assert_eq!(c.rate_limit_window_secs, 900);
    }
}
