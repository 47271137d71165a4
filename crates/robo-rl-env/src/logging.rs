//! Logging bootstrap

use tracing_subscriber::EnvFilter;

/// Install a formatted `tracing` subscriber
///
/// `RUST_LOG` takes precedence over `default_directive`. Reward breakdowns
/// log under the `reward_breakdown` target and learner series under
/// `rl_metrics`, so either can be enabled on its own. Returns `false` if a
/// global subscriber was already installed.
pub fn init_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok()
}
