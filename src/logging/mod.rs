/*!
 * Logging Module
 * Subscriber setup: console plus daily rolling files, filtered by RUST_LOG
 */
pub mod config;
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use self::config::{LogConfig, LogFormat};

/// Initialize the logging system.
///
/// The returned guards flush the background writers when dropped, so the
/// caller must hold them for the life of the process.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    if let Err(e) = std::fs::create_dir_all(&config.directory) {
        eprintln!("cannot create log directory {}: {}", config.directory, e);
    }

    let file_appender = rolling::daily(&config.directory, "app.log");
    let (file_writer, file_guard) = non_blocking(file_appender);

    let error_appender = rolling::daily(&config.directory, "error.log");
    let (error_writer, error_guard) = non_blocking(error_appender);

    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            let error_layer = fmt::layer()
                .json()
                .with_writer(error_writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

            let console_layer = fmt::layer()
                .json()
                .with_writer(console_writer)
                .with_target(false);

            subscriber
                .with(file_layer)
                .with(error_layer)
                .with(console_layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let file_layer = fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);

            let error_layer = fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

            let console_layer = fmt::layer()
                .with_writer(console_writer)
                .with_target(true)
                .pretty();

            subscriber
                .with(file_layer)
                .with(error_layer)
                .with(console_layer)
                .try_init()
        }
    };

    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }

    tracing::info!(format = %config.format, dir = %config.directory, "Logging initialized");
    vec![file_guard, error_guard, console_guard]
}
