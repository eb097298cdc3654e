use crate::config::ConfigResolver;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console and file logging from the `logging.*` settings.
///
/// `RUST_LOG` takes precedence over `logging.log_level`. The returned guard
/// flushes the file writer when dropped; keep it alive for the whole run.
pub fn init_logging(config: &ConfigResolver) -> WorkerGuard {
    let log_dir = config
        .get_str("logging.log_dir", None)
        .unwrap_or_else(|_| "logs".to_string());
    let log_file = config
        .get_str("logging.log_file", None)
        .unwrap_or_else(|_| "pipeline.log".to_string());
    let log_level = config
        .get_str("logging.log_level", None)
        .unwrap_or_else(|_| "info".to_string());

    let _ = fs::create_dir_all(&log_dir);

    // Daily rotation, JSON lines
    let file_appender = tracing_appender::rolling::daily(&log_dir, &log_file);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("places_ranker={log_level},{log_level}")))
        .unwrap_or_else(|_| EnvFilter::new("places_ranker=info,info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
