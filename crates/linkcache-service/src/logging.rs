use std::env;
use std::io::IsTerminal;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, Logging};

/// Initializes logging for an embedding application.
///
/// This considers the `RUST_LOG` environment variable and defaults it to the
/// level specified in the configuration.
pub fn init_logging(config: &Logging) {
    let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| config.level.to_string());

    let format = match config.format {
        LogFormat::Auto if std::io::stdout().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        other => other,
    };

    if format == LogFormat::Json {
        init_json_logging(&rust_log, std::io::stdout);
        return;
    }

    let layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true);
    let layer = match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        _ => layer.compact().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(EnvFilter::new(&rust_log)))
        .init();
}

/// JSON-lines logging for log collectors.
pub fn init_json_logging<W>(env_filter: &str, make_writer: W)
where
    W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    fmt::fmt()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_env_filter(env_filter)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(make_writer)
        .init();
}
