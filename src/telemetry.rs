//! Logging setup for embedding applications

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{PwnError, Result};

/// Install a global subscriber writing to stdout.
///
/// `RUST_LOG` takes precedence over `default_level`. Fails if the process
/// already has a global subscriber.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init()
        .map_err(|e| PwnError::InternalError(format!("Failed to install log subscriber: {}", e)))?;

    tracing::info!("pwngraph logging initialised at {}", default_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // The first call may lose to another test's subscriber; the second never succeeds
        let _ = init_logging("debug");
        assert!(init_logging("debug").is_err());
    }
}
