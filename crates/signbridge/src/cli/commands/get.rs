//! Get command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::{info, warn};
use uuid::Uuid;

use signbridge_signing::{SigningFacade, SigningRequestId};

use super::{load_config, organization_id, runtime, signing_facade, until_cancelled, TokenArgs};
use crate::cli::{output, Cli, OutputFormat};

/// Download the signed artifact of an earlier signing request
#[derive(Debug, Args)]
pub struct GetCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Organization id (UUID)
    #[arg(long)]
    pub organization_id: Option<Uuid>,

    /// Signing request id printed by `signbridge submit`
    #[arg(long)]
    pub request_id: SigningRequestId,

    /// Where to write the signed artifact
    #[arg(short, long)]
    pub output: PathBuf,

    /// How many times to ask for the artifact before giving up
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 30)]
    pub retry_interval: u64,
}

impl GetCommand {
    /// Execute the get command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            signing_request_id = %self.request_id,
            attempts = self.attempts,
            "executing get command"
        );
        let (config, _) = load_config(cli)?;
        let organization_id = organization_id(self.organization_id, &config)?;
        let facade = signing_facade(&config, &self.token.token)?;

        let rt = runtime()?;
        let bytes = rt.block_on(until_cancelled(self.download(
            cli,
            facade.as_ref(),
            organization_id,
        )))?;

        match cli.format {
            OutputFormat::Json => output::json(&serde_json::json!({
                "organization_id": organization_id,
                "signing_request_id": self.request_id,
                "output": self.output,
                "bytes": bytes,
            })),
            OutputFormat::Text => {
                if !cli.quiet {
                    output::success(&format!(
                        "Signed artifact written to {} ({} bytes)",
                        output::path_style().apply_to(self.output.display()),
                        bytes
                    ));
                }
                Ok(())
            }
        }
    }

    /// Fetch the artifact, retrying backend failures until the attempts run out
    async fn download(
        &self,
        cli: &Cli,
        facade: &dyn SigningFacade,
        organization_id: Uuid,
    ) -> anyhow::Result<u64> {
        let mut attempt = 1;
        loop {
            match facade
                .get_signed_artifact(organization_id, self.request_id)
                .await
            {
                Ok(mut signed) => {
                    let bytes = signed.persist_to(&self.output)?;
                    signed.release();
                    return Ok(bytes);
                }
                Err(e) if e.is_backend_failure() && attempt < self.attempts => {
                    warn!(attempt, error = %e, "signed artifact not available, retrying");
                    if !cli.quiet {
                        output::warning(&format!(
                            "Attempt {}/{} failed, retrying in {}s",
                            attempt, self.attempts, self.retry_interval
                        ));
                    }
                    tokio::time::sleep(Duration::from_secs(self.retry_interval)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "Failed to get signed artifact for request {} after {} attempt(s)",
                            self.request_id, attempt
                        )
                    });
                }
            }
        }
    }
}
