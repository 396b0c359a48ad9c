//! Logging setup
//!
//! Console logging with an `EnvFilter` override (`RUST_LOG`), JSON format
//! for production deployments. Hosts embedding the engine call this once
//! at startup; tests leave it uninitialized and capture events directly.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber.
///
/// `level` is the fallback filter when `RUST_LOG` is unset. Returns an
/// error if a subscriber is already installed.
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to set logger: {e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to set logger: {e}"))?;
    }

    tracing::info!(level, json_format, "Logger initialized");
    Ok(())
}
