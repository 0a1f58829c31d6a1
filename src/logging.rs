//! Logging setup, following the teacher's `utils/logging.rs` pattern.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging for the demo binary and integration tests.
pub fn init_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,monkey_king=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
    Ok(())
}
