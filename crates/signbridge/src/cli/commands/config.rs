//! Config command

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use signbridge_core::config::defaults::{default_config_toml, DEFAULT_CONFIG_TOML};
use signbridge_core::Config;

use super::load_config;
use crate::cli::{output, Cli, OutputFormat};

/// Create or check the configuration file
#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

/// Config subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Write a configuration file with default values
    Init(InitCommand),

    /// Load and validate the configuration
    Validate,
}

/// Write a configuration file with default values
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Output file path (`.toml` or `.yaml`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ConfigCommand {
    /// Execute the config command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            ConfigSubcommand::Init(cmd) => cmd.execute(cli),
            ConfigSubcommand::Validate => validate(cli),
        }
    }
}

impl InitCommand {
    fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, "executing config init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_TOML));

        write_default_config(&config_path, self.force)?;

        match cli.format {
            OutputFormat::Json => output::json(&serde_json::json!({
                "created": config_path,
            })),
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!(
                        "Created {}",
                        output::path_style().apply_to(config_path.display())
                    ));
                    output::info("Set defaults.organization_id, project and signing_policy next");
                }
                Ok(())
            }
        }
    }
}

/// Write the default configuration, as YAML for `.yaml`/`.yml` paths and TOML otherwise
fn write_default_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    let is_yaml = path
        .extension()
        .is_some_and(|e| e == "yaml" || e == "yml");
    let content = if is_yaml {
        serde_yaml::to_string(&Config::default())?
    } else {
        default_config_toml()?
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    info!(path = %path.display(), "wrote default config");
    Ok(())
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    info!("executing config validate command");
    let (config, config_path) = match load_config(cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            if cli.format == OutputFormat::Json {
                output::json(&serde_json::json!({
                    "valid": false,
                    "config_path": cli.config,
                    "errors": [format!("{:#}", e)],
                }))?;
            }
            return Err(e);
        }
    };

    match cli.format {
        OutputFormat::Json => output::json(&serde_json::json!({
            "valid": true,
            "config_path": config_path,
            "config": config,
        })),
        OutputFormat::Text => {
            if !cli.quiet {
                match &config_path {
                    Some(path) => println!("Config: {}", style(path.display()).cyan()),
                    None => output::warning("No config file found, using defaults"),
                }
                println!("{}", output::key_value("API", &config.api.url));
                println!(
                    "{}",
                    output::key_value(
                        "Module",
                        &format!("{} via {}", config.executor.module, config.executor.program)
                    )
                );
                println!(
                    "{}",
                    output::key_value(
                        "Timeouts",
                        &format!(
                            "process {}s, completion {}s",
                            config.api.wait_for_process_timeout_secs,
                            config.api.wait_for_completion_timeout_secs
                        )
                    )
                );
                println!();
                println!("{}", style("✓ Configuration is valid").green().bold());
            }
            Ok(())
        }
    }
}
