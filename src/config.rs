//! Environment-driven runtime settings.

use crate::error::{AgentFlowError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_MODEL_RETRIES: u32 = 3;

/// Process-wide runtime settings, loaded once from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Logger verbosity filter (`debug`/`info`/`warn`/`error`, or any
    /// `tracing` filter directive)
    pub log_filter: String,
    /// Whether to additionally emit JSON records for the remote log sink
    pub remote_log_enabled: bool,
    /// Remote sink identifier; required when the remote sink is enabled
    pub remote_log_group: Option<String>,
    /// Region for the model provider
    pub provider_region: String,
    /// Default per-step deadline
    pub default_step_timeout: Duration,
    /// Default whole-workflow deadline
    pub default_workflow_timeout: Duration,
    /// Default retry attempts for the model client
    pub max_model_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            remote_log_enabled: false,
            remote_log_group: None,
            provider_region: DEFAULT_REGION.to_string(),
            default_step_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_workflow_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_model_retries: DEFAULT_MAX_MODEL_RETRIES,
        }
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// Recognized variables: `AGENTFLOW_LOG`, `AGENTFLOW_REMOTE_LOG`,
    /// `AGENTFLOW_REMOTE_LOG_GROUP`, `AGENTFLOW_PROVIDER_REGION`,
    /// `AGENTFLOW_STEP_TIMEOUT_SECS`, `AGENTFLOW_WORKFLOW_TIMEOUT_SECS`,
    /// `AGENTFLOW_MAX_MODEL_RETRIES`. All are optional;
    /// `AGENTFLOW_REMOTE_LOG_GROUP` becomes required when
    /// `AGENTFLOW_REMOTE_LOG` is truthy.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let remote_log_enabled = env_flag("AGENTFLOW_REMOTE_LOG")?;
        let remote_log_group = std::env::var("AGENTFLOW_REMOTE_LOG_GROUP").ok();

        if remote_log_enabled && remote_log_group.is_none() {
            return Err(AgentFlowError::configuration(
                "AGENTFLOW_REMOTE_LOG_GROUP is required when AGENTFLOW_REMOTE_LOG is enabled",
            ));
        }

        Ok(Self {
            log_filter: std::env::var("AGENTFLOW_LOG").unwrap_or(defaults.log_filter),
            remote_log_enabled,
            remote_log_group,
            provider_region: std::env::var("AGENTFLOW_PROVIDER_REGION")
                .unwrap_or(defaults.provider_region),
            default_step_timeout: env_duration_secs(
                "AGENTFLOW_STEP_TIMEOUT_SECS",
                defaults.default_step_timeout,
            )?,
            default_workflow_timeout: env_duration_secs(
                "AGENTFLOW_WORKFLOW_TIMEOUT_SECS",
                defaults.default_workflow_timeout,
            )?,
            max_model_retries: env_u32(
                "AGENTFLOW_MAX_MODEL_RETRIES",
                defaults.max_model_retries,
            )?,
        })
    }
}

fn env_flag(name: &str) -> Result<bool> {
    match std::env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(AgentFlowError::configuration(format!(
                "{name} must be a boolean, got '{other}'"
            ))),
        },
        Err(_) => Ok(false),
    }
}

fn env_u32(name: &str, default: u32) -> Result<u32> {
    match std::env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|_| {
            AgentFlowError::configuration(format!("{name} must be an integer, got '{value}'"))
        }),
        Err(_) => Ok(default),
    }
}

fn env_duration_secs(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                AgentFlowError::configuration(format!(
                    "{name} must be a number of seconds, got '{value}'"
                ))
            }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment mutation is process-global; serialize these tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for name in [
            "AGENTFLOW_LOG",
            "AGENTFLOW_REMOTE_LOG",
            "AGENTFLOW_REMOTE_LOG_GROUP",
            "AGENTFLOW_PROVIDER_REGION",
            "AGENTFLOW_STEP_TIMEOUT_SECS",
            "AGENTFLOW_WORKFLOW_TIMEOUT_SECS",
            "AGENTFLOW_MAX_MODEL_RETRIES",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.log_filter, "info");
        assert!(!settings.remote_log_enabled);
        assert_eq!(settings.provider_region, "us-east-1");
        assert_eq!(settings.default_step_timeout, Duration::from_secs(300));
        assert_eq!(settings.max_model_retries, 3);
    }

    #[test]
    fn test_remote_log_requires_group() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("AGENTFLOW_REMOTE_LOG", "true");
        let err = Settings::from_env().unwrap_err();
        assert_eq!(err.kind(), "configuration");

        std::env::set_var("AGENTFLOW_REMOTE_LOG_GROUP", "agentflow-prod");
        let settings = Settings::from_env().unwrap();
        assert!(settings.remote_log_enabled);
        assert_eq!(
            settings.remote_log_group.as_deref(),
            Some("agentflow-prod")
        );
        clear_env();
    }

    #[test]
    fn test_malformed_numeric() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();

        std::env::set_var("AGENTFLOW_STEP_TIMEOUT_SECS", "soon");
        let err = Settings::from_env().unwrap_err();
        assert_eq!(err.kind(), "configuration");
        clear_env();
    }
}
