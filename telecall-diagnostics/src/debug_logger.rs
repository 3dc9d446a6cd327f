//! Structured debug logging system

use telecall_core::{CallError, CallResult};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Installs the process-wide `tracing` subscriber
#[derive(Debug, Default)]
pub struct DebugLogger;

impl DebugLogger {
    /// Initialize logging from `RUST_LOG`, falling back to `info`.
    ///
    /// Returns `false` when a subscriber was already installed; that is not an error.
    pub fn init_logging() -> bool {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        Self::install(filter)
    }

    /// Initialize logging with an explicit filter such as `"telecall=debug,info"`
    pub fn init_with_filter(directives: &str) -> CallResult<bool> {
        let filter = EnvFilter::try_new(directives).map_err(|e| CallError::InvalidConfiguration {
            reason: format!("invalid log filter '{}': {}", directives, e),
        })?;
        Ok(Self::install(filter))
    }

    fn install(filter: EnvFilter) -> bool {
        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!("Logging initialized");
        }
        installed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        DebugLogger::init_logging();
        assert!(!DebugLogger::init_logging());
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result = DebugLogger::init_with_filter("telecall=loud");
        assert!(matches!(result, Err(CallError::InvalidConfiguration { .. })));
    }
}
