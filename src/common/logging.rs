//! Logging and tracing configuration
//!
//! The server logs to stderr only. The smoke harness additionally keeps a
//! plain-text log file so a failed nightly run can be inspected afterwards.

use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::paths;

/// File name of the smoke harness log
const SMOKE_LOG: &str = "smoke.log";

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(env_filter("layaudio=info,warn"))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .compact(),
        )
        .init();
}

/// Debug-level file layer writing `<dir>/smoke.log`
fn smoke_file_layer<S>(dir: &Path) -> (impl Layer<S>, WorkerGuard)
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::never(dir, SMOKE_LOG);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter("layaudio=debug,warn"));
    (layer, guard)
}

/// Warnings only, the progress lines go to stdout
fn smoke_stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(env_filter("warn"))
}

/// Initialize tracing for a smoke run (file + stderr logging)
///
/// The file lives at `<data dir>/logs/smoke.log` and is appended to. It gets
/// debug output; stderr keeps to warnings so the progress lines stay readable.
/// The returned guard flushes the file writer and must outlive the run.
pub fn init_smoke() -> (Option<PathBuf>, Option<WorkerGuard>) {
    let log_dir = match paths::ensure_log_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Warning: Could not create log directory: {}", e);
            None
        }
    };

    match log_dir {
        Some(dir) => {
            let (file_layer, guard) = smoke_file_layer(&dir);
            tracing_subscriber::registry()
                .with(file_layer)
                .with(smoke_stderr_layer())
                .init();
            (Some(dir.join(SMOKE_LOG)), Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(smoke_stderr_layer())
                .init();
            (None, None)
        }
    }
}
