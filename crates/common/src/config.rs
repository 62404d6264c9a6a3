//! Configuration types shared by the authorizer crates.

use serde::{Deserialize, Serialize};

/// Default `EnvFilter` directive used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "authorizer=info,tower_http=info";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Emit JSON-formatted logs instead of human-readable lines
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            json_logs: false,
        }
    }
}
