//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{ConfigCommand, GetCommand, SubmitCommand};

/// Signbridge - submit build artifacts to a remote code-signing service
#[derive(Debug, Parser)]
#[command(name = "signbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (searched from the working directory by default)
    #[arg(long, global = true, env = "SIGNBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Submit an artifact for signing
    Submit(SubmitCommand),

    /// Download the signed artifact of an earlier signing request
    Get(GetCommand),

    /// Create or check the configuration file
    Config(ConfigCommand),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(&self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match &self.command {
            Commands::Submit(cmd) => cmd.execute(self),
            Commands::Get(cmd) => cmd.execute(self),
            Commands::Config(cmd) => cmd.execute(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "signbridge",
            "get",
            "--token",
            "t0ken",
            "--organization-id",
            "b6f1c1a2-0000-4000-8000-000000000001",
            "--request-id",
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "--output",
            "out.exe",
            "--format",
            "json",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Get(_)));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["signbridge", "-v", "-q", "config", "validate"]).is_err());
    }
}
