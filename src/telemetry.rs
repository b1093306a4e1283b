use tracing_subscriber::EnvFilter;

use crate::error::PilotError;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `--verbose` means `debug` and the
/// configured level applies.
pub fn init(log_level: &str, verbose: bool) -> Result<(), PilotError> {
    let fallback = if verbose { "debug" } else { log_level };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(fallback).map_err(|err| {
            PilotError::Telemetry(format!("invalid log filter '{fallback}': {err}"))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| PilotError::Telemetry(err.to_string()))
}
