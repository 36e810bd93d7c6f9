use crate::models::RelinkSettings;
use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

/// How the global subscriber is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Directory for the daily rotating log files
    pub log_dir: String,

    /// File name prefix of the log files
    pub log_prefix: String,

    /// Debug level instead of info, unless `RUST_LOG` says otherwise
    pub debug_mode: bool,

    /// Mirror log lines to stderr
    pub console_output: bool,

    /// Write the file log as JSON lines
    pub json: bool,
}

impl LoggingOptions {
    pub fn from_settings(settings: &RelinkSettings, log_prefix: &str) -> Self {
        Self {
            log_dir: settings.log_dir.clone(),
            log_prefix: log_prefix.to_string(),
            debug_mode: settings.debug_mode,
            console_output: false,
            json: false,
        }
    }
}

/// Install the global subscriber described by `options`.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(options: &LoggingOptions) -> Result<WorkerGuard> {
    prepare_log_dir(Utf8Path::new(&options.log_dir))?;

    let file_appender = rolling::daily(&options.log_dir, &options.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI codes in log files
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = if options.json {
        file_layer.json().boxed()
    } else {
        file_layer.boxed()
    };

    let console_layer = options.console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(build_filter(options.debug_mode))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, debug={}, console={}, json={}",
        options.log_dir,
        options.log_prefix,
        options.debug_mode,
        options.console_output,
        options.json
    );

    Ok(guard)
}

/// `RUST_LOG` wins; otherwise debug or info depending on `debug_mode`.
fn build_filter(debug_mode: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(debug_mode)))
}

fn default_directive(debug_mode: bool) -> &'static str {
    if debug_mode { "debug" } else { "info" }
}

fn prepare_log_dir(log_dir: &Utf8Path) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir).with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}
