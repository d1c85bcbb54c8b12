//! Logging system initialization
//!
//! Sets up the tracing subscriber from the `[logging]` configuration:
//! console or file output, daily rotation, text or JSON format.

use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;

use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;

use crate::config::AppConfig;

const DEFAULT_LOG_FILE: &str = "ip-analyzer.log";

/// Span tagging every log line of a worker process with its id
pub fn worker_span(worker_id: usize) -> Span {
    tracing::info_span!("worker", id = worker_id)
}

fn build_writer(config: &AppConfig) -> Box<dyn Write + Send + Sync> {
    let Some(log_file) = config.logging.file.as_deref().filter(|f| !f.is_empty()) else {
        return Box::new(std::io::stdout());
    };

    if config.logging.enable_rotation {
        let path = Path::new(log_file);
        let dir = path.parent().unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or(DEFAULT_LOG_FILE);

        match rolling::Builder::new()
            .rotation(rolling::Rotation::DAILY)
            .filename_prefix(filename.trim_end_matches(".log"))
            .filename_suffix("log")
            .max_log_files(config.logging.max_backups as usize)
            .build(dir)
        {
            Ok(appender) => return Box::new(appender),
            Err(e) => eprintln!("Failed to create rolling log appender: {}", e),
        }
    } else {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
        {
            Ok(file) => return Box::new(file),
            Err(e) => eprintln!("Failed to open log file {}: {}", log_file, e),
        }
    }

    // 文件不可用时退回控制台
    Box::new(std::io::stdout())
}

/// Initialize logging system based on configuration
///
/// Call once, after the configuration has been loaded. The returned guard
/// must stay alive for the duration of the program so buffered lines are
/// flushed.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(build_writer(config));
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber_builder = tracing_subscriber::fmt()
        .with_writer(non_blocking_writer)
        .with_env_filter(filter)
        .with_level(true)
        .with_ansi(config.logging.file.as_ref().is_none_or(|f| f.is_empty()));

    let result = if config.logging.format == "json" {
        subscriber_builder.json().try_init()
    } else {
        subscriber_builder.try_init()
    };
    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }

    guard
}
