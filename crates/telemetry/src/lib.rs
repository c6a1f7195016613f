//! Tracing subscriber bootstrap driven by [`TelemetrySettings`].

use anyhow::Context;
use libris_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::{fmt, EnvFilter};

/// Resolve the filter: `RUST_LOG` when set and valid, else the configured directive.
pub fn env_filter(settings: &TelemetrySettings) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.filter)
        .with_context(|| format!("invalid log filter '{}'", settings.filter))
}

/// Install the global subscriber. Calling it again is a no-op, so binaries
/// and tests can both call it freely.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = env_filter(settings)?;

    let installed = match settings.log_format {
        LogFormat::Pretty => fmt().with_env_filter(filter).with_target(true).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!(
            target: "libris-telemetry",
            format = ?settings.log_format,
            "telemetry initialized"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_filter_is_parsed() {
        let settings = TelemetrySettings {
            filter: "libris_app=debug,tower_http=info".to_string(),
            ..TelemetrySettings::default()
        };
        assert!(env_filter(&settings).is_ok());
    }

    #[test]
    fn init_is_idempotent() {
        let settings = TelemetrySettings::default();
        init(&settings).unwrap();
        init(&settings).unwrap();
    }
}
