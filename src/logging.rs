use crate::models::LoggingSettings;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose info-level chatter drowns out the relay log.
const QUIET_TARGETS: &[&str] = &["winit=warn", "calloop=warn", "sctk=warn", "skia_safe=warn"];

/// Install the global subscriber described by the `logging` config section.
///
/// Log lines go to `<directory>/<prefix>.<date>`, rotated daily, and to the
/// console when `console` is set. `RUST_LOG` replaces the configured level.
///
/// # Returns
/// A guard that must be held for the duration of the program; dropping it
/// flushes and stops the background writer.
pub fn setup_logging(settings: &LoggingSettings, log_prefix: &str) -> Result<WorkerGuard> {
    let log_dir = Utf8Path::new(&settings.directory);
    ensure_log_dir(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, log_prefix));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = if settings.json {
        file_layer.json().with_current_span(true).boxed()
    } else {
        file_layer.boxed()
    };

    let console_layer = settings
        .console
        .then(|| tracing_subscriber::fmt::layer().with_target(false).compact());

    tracing_subscriber::registry()
        .with(build_filter(settings.debug, std::env::var("RUST_LOG").ok().as_deref()))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the global tracing subscriber")?;

    tracing::info!(
        "Logging to {}/{} (debug: {}, console: {}, json: {})",
        log_dir,
        log_prefix,
        settings.debug,
        settings.console,
        settings.json
    );

    Ok(guard)
}

/// Level filter: `rust_log` if it parses, else `debug`/`info` with the
/// windowing crates held at `warn`.
fn build_filter(debug: bool, rust_log: Option<&str>) -> EnvFilter {
    if let Some(directives) = rust_log.filter(|d| !d.trim().is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(filter) => return filter,
            Err(e) => eprintln!("Ignoring invalid RUST_LOG ({}): {}", directives, e),
        }
    }

    let level = if debug { "debug" } else { "info" };
    let directives = std::iter::once(level)
        .chain(QUIET_TARGETS.iter().copied())
        .collect::<Vec<_>>()
        .join(",");
    EnvFilter::new(directives)
}

fn ensure_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}
