//! Shared tracing bootstrap for gale processes.

use crate::{Error, Result};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a process-wide fmt subscriber at the given level.
///
/// Safe to call more than once; only the first installation wins, later
/// calls are no-ops so tests can share a process.
pub fn init_tracing(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

fn parse_level(level: &str) -> Result<Level> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" | "" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Validation(format!(
            "unknown log level '{}'; expected one of trace, debug, info, warn, error",
            other
        ))),
    }
}
