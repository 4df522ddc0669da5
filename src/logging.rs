//! Tracing configuration and log routing.
//!
//! The server and CLI log to stderr using a compact formatter, and to a file. When
//! `STUDYGUIDE_LOG_FILE` is set, logs are appended to that path; otherwise a file logger is
//! created under `logs/studyguide.log`. Setting it to `off` disables the file layer.
//! Map-phase failures are only reported through logging, so the file layer keeps them
//! around after the request has returned.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
const LOG_FILE_ENV: &str = "STUDYGUIDE_LOG_FILE";

/// Configure tracing subscribers for console and optional file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact console layer (written to stderr) and, when available, a file layer.
/// - Uses a global guard to keep the non‑blocking writer alive for the process lifetime.
pub fn init_tracing() {
    init_tracing_with_console(true);
}

/// Configure tracing, optionally skipping the console layer.
///
/// The CLI can run quietly and route logs to the file only.
pub fn init_tracing_with_console(console: bool) {
    // `RUST_LOG` and the log file path may come from `.env`.
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = console.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
    });

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

/// Build a non‑blocking writer for file logging.
///
/// Returns `None` when file logging is disabled (`STUDYGUIDE_LOG_FILE=off`), or when the logs
/// directory cannot be created or the target file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    if let Ok(path) = std::env::var(LOG_FILE_ENV) {
        if matches!(path.trim(), "" | "off" | "none") {
            return None;
        }
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                None
            }
        }
    } else {
        if let Err(err) = std::fs::create_dir_all("logs") {
            eprintln!("Failed to create logs directory: {err}");
            return None;
        }
        let file_appender = tracing_appender::rolling::never("logs", "studyguide.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(non_blocking)
    }
}
