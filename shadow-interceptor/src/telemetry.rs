use anyhow::Result;
use once_cell::sync::OnceCell;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Tracing for long-running use.
///
/// - stdout: human logs.
/// - file: `<log_dir>/<service>.jsonl`, hourly rolling.
/// - `RUST_LOG` overrides the level (e.g. `info,shadow_interceptor=debug`).
pub fn init_tracing(service: &str, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::hourly(log_dir, format!("{service}.jsonl"));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    // dropping the guard loses buffered lines
    let _ = TRACING_GUARD.set(guard);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_names(true);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stdout_layer)
        .with(json_layer)
        .try_init()?;

    Ok(())
}

/// Stderr-only tracing for one-shot commands, quiet unless `RUST_LOG` says
/// otherwise so stdout stays machine readable.
pub fn init_console() -> Result<()> {
    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(layer)
        .try_init()?;

    Ok(())
}
