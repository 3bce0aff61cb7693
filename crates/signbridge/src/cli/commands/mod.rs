//! CLI commands

mod config;
mod get;
mod submit;

pub use config::ConfigCommand;
pub use get::GetCommand;
pub use submit::SubmitCommand;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use signbridge_core::{
    load_config_or_default, ApiConfig, Config, ConfigError, ExecutorConfig,
};
use signbridge_signing::{
    ApiConfiguration, Credentials, PowerShellSigningFacadeFactory, ProcessExecutor, SigningBackend,
    SigningFacade, SigningFacadeFactory,
};

use crate::cli::Cli;
use crate::exit_codes::Cancelled;

/// API token of the CI user
#[derive(Args)]
pub struct TokenArgs {
    /// API token used to authenticate against the signing service
    #[arg(long, env = "SIGNBRIDGE_TOKEN", hide_env_values = true)]
    pub token: String,
}

impl fmt::Debug for TokenArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenArgs")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Load the configuration named by `--config`, or search for one from the working directory
pub(crate) fn load_config(cli: &Cli) -> anyhow::Result<(Config, Option<PathBuf>)> {
    match &cli.config {
        Some(path) => {
            let config = signbridge_core::load_config(path)?;
            Ok((config, Some(path.clone())))
        }
        None => {
            let cwd = std::env::current_dir()?;
            Ok(load_config_or_default(&cwd)?)
        }
    }
}

/// Convert the `[api]` section into the signing crate's configuration
pub(crate) fn api_configuration(config: &ApiConfig) -> anyhow::Result<ApiConfiguration> {
    let url = Url::parse(&config.url).map_err(|e| ConfigError::invalid("api.url", e.to_string()))?;
    Ok(ApiConfiguration::new(url)
        .with_process_timeout(config.wait_for_process_timeout_secs)
        .with_service_unavailable_timeout(config.service_unavailable_timeout_secs)
        .with_upload_and_download_timeout(config.upload_and_download_request_timeout_secs)
        .with_completion_timeout(config.wait_for_completion_timeout_secs))
}

/// Build the process executor described by the `[executor]` section
pub(crate) fn process_executor(config: &ExecutorConfig) -> ProcessExecutor {
    let executor = ProcessExecutor::powershell(&config.module)
        .with_program(&config.program)
        .with_args(config.args.iter().cloned())
        .fail_on_stderr(config.fail_on_stderr);

    match &config.error_marker {
        Some(marker) => executor.with_error_marker(marker),
        None => executor,
    }
}

/// Create a signing facade for `token` from the loaded configuration
pub(crate) fn signing_facade(config: &Config, token: &str) -> anyhow::Result<Arc<dyn SigningFacade>> {
    let executor = process_executor(&config.executor);
    debug!(program = executor.program(), module = %config.executor.module, "using signing module");

    let backend: Arc<dyn SigningBackend> = Arc::new(executor);
    let factory = PowerShellSigningFacadeFactory::new(backend, api_configuration(&config.api)?)?;
    Ok(factory.create(Credentials::new(token))?)
}

/// A value from the command line, falling back to `[defaults]` in the config file
pub(crate) fn required(
    flag: Option<&str>,
    default: Option<&str>,
    name: &str,
) -> anyhow::Result<String> {
    flag.or(default)
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::MissingField(format!(
                "{} (pass --{} or set defaults.{} in the config file)",
                name,
                name.replace('_', "-"),
                name
            ))
            .into()
        })
}

/// The organization id from the command line or `[defaults]`
pub(crate) fn organization_id(flag: Option<Uuid>, config: &Config) -> anyhow::Result<Uuid> {
    if let Some(id) = flag {
        return Ok(id);
    }
    let value = required(None, config.defaults.organization_id.as_deref(), "organization_id")?;
    Ok(Uuid::parse_str(&value)
        .map_err(|e| ConfigError::invalid("defaults.organization_id", e.to_string()))?)
}

/// Create the runtime the async commands run on
pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

/// Run `future` until it finishes or the user presses Ctrl-C.
///
/// On Ctrl-C the future is dropped, which kills a running signing process and
/// releases its temporary files.
pub(crate) async fn until_cancelled<F, T>(future: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        result = future => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("interrupted, cleaning up");
            Err(Cancelled.into())
        }
    }
}
