//! Signbridge - submit build artifacts to a remote code-signing service

mod cli;
mod exit_codes;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use cli::Cli;

fn main() {
    let cli = Cli::parse();
    let code = run(cli);
    std::process::exit(code);
}

/// Run the CLI and map its outcome to an exit code.
///
/// Both guards are dropped before returning so logs are flushed and leftover
/// temporary files are removed before the process exits.
fn run(cli: Cli) -> i32 {
    let _log_guard = init_tracing(cli.verbose, cli.quiet);
    let _cleanup = signbridge_signing::cleanup::init();

    match cli.execute() {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            let code = exit_codes::for_error(&e);
            tracing::debug!(error = ?e, code, "command failed");
            cli::output::error(&format!("{:#}", e));
            code
        }
    }
}

/// Set up tracing with two layers:
/// - Console: controlled by RUST_LOG (default: warn, info with --verbose, error with --quiet)
/// - File: always debug-level JSON to ~/.signbridge/logs/
fn init_tracing(verbose: bool, quiet: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(log_dir) = log_directory() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "signbridge.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_filter(console_filter),
            )
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_filter(EnvFilter::new("debug")),
            )
            .init();

        return Some(guard);
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .init();

    None
}

/// Returns the log directory path, creating it if needed.
fn log_directory() -> Option<std::path::PathBuf> {
    let log_dir = dirs::home_dir()?.join(".signbridge").join("logs");
    std::fs::create_dir_all(&log_dir).ok()?;
    Some(log_dir)
}
