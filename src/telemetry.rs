//! Tracing subscriber setup.
//!
//! # Configuration
//!
//! - `RUST_LOG`: standard env-filter directives (default: `info`)
//!
//! # Usage
//!
//! ```rust,ignore
//! broker_gateway::telemetry::init_telemetry();
//! ```

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_telemetry() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_telemetry();
        init_telemetry();
    }
}
