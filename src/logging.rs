//! Structured logging: stderr plus daily rolling files.

use std::fs;
use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset. Audio and HTTP internals are noisy.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,rodio=warn,cpal=warn";

/// Initialize structured logging.
///
/// - File output: `{log_dir}/narrator.YYYY-MM-DD.log`, daily rotation, 5 files kept.
/// - Console output on stderr (stdout carries the JSON-line protocol).
/// - `RUST_LOG` overrides the default filter.
///
/// If the file appender cannot be created, logging continues on stderr only.
/// Fails if a global subscriber is already set.
pub fn init(log_dir: &Path) -> anyhow::Result<()> {
    if let Err(e) = fs::create_dir_all(log_dir) {
        eprintln!("Failed to create log directory {}: {}", log_dir.display(), e);
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .compact();

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("narrator")
        .filename_suffix("log")
        .max_log_files(5)
        .build(log_dir);

    let file_layer = match file_appender {
        Ok(appender) => Some(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        ),
        Err(ref e) => {
            eprintln!("Failed to create log file appender in {}: {}", log_dir.display(), e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
    Ok(())
}
