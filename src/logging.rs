//! Tracing subscriber setup shared by the binaries

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `directive` applies with the
/// configured level, e.g. `pr_risk_prediction=info`.
pub fn init_logging(config: &LoggingConfig, target: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn").add_directive(
            format!("{target}={}", config.level)
                .parse()
                .with_context(|| format!("invalid log level `{}`", config.level))?,
        ),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.format == "json" {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.pretty().try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

