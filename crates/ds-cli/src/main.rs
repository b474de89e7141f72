use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use ds_core::models::Settings;
use ds_core::services::output::OutputSink;

use ds_cli::cli::Cli;
use ds_cli::commands::{self, Context};
use ds_cli::console::ConsoleSink;

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let sink = ConsoleSink::detect();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => return Ok(report(&sink, &e)),
    };

    // Held for the life of the program so buffered lines reach the file.
    let _guard = if cli.debug {
        Some(setup_debug_logging(&settings.project_root))
    } else {
        setup_env_logging();
        None
    };
    tracing::debug!(root = %settings.project_root.display(), "settings resolved");

    let ctx = Context::new(settings, &sink);
    match commands::dispatch(cli.command, &ctx).await {
        Ok(code) => Ok(code),
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            Ok(report(&sink, &e))
        }
    }
}

fn report(sink: &ConsoleSink, error: &ds_core::DevstackError) -> ExitCode {
    let sink: &dyn OutputSink = sink;
    sink.error(format!("Error: {error}"));
    if let Some(hint) = error.hint() {
        sink.error(format!("Hint: {hint}"));
    }
    ExitCode::FAILURE
}

/// Configure file-based tracing to `.devstack-debug.log` in the project root.
/// Returns the guard that must be held alive for the duration of the program.
fn setup_debug_logging(root: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(root, ".devstack-debug.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_ansi(false)
        .init();

    guard
}

/// Diagnostics on stderr, only when `RUST_LOG` asks for them.
fn setup_env_logging() {
    if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}
