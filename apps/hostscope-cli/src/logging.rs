use crate::config::{LogFormat, LoggingConfig};
use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Resolve `auto` against whether stderr is a terminal.
pub fn effective_format(format: LogFormat, stderr_is_terminal: bool) -> LogFormat {
    match format {
        LogFormat::Auto if stderr_is_terminal => LogFormat::Text,
        LogFormat::Auto => LogFormat::Json,
        other => other,
    }
}

/// Install the global subscriber. Logs always go to stderr; stdout carries
/// only the rendered snapshot. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let is_terminal = std::io::stderr().is_terminal();
    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(is_terminal);
    let fmt_layer = match effective_format(config.format, is_terminal) {
        LogFormat::Json => base.json().boxed(),
        LogFormat::Text | LogFormat::Auto => base.boxed(),
    };

    // A subscriber installed earlier wins
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_format_follows_terminal() {
        assert_eq!(effective_format(LogFormat::Auto, true), LogFormat::Text);
        assert_eq!(effective_format(LogFormat::Auto, false), LogFormat::Json);
        assert_eq!(effective_format(LogFormat::Json, true), LogFormat::Json);
        assert_eq!(effective_format(LogFormat::Text, false), LogFormat::Text);
    }
}
