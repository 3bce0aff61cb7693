//! Submit command

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Args;
use console::style;
use tracing::info;
use uuid::Uuid;

use signbridge_core::Config;
use signbridge_signing::{
    RepositoryMetadata, SigningFacade, SigningRequest, SigningRequestOrigin, TemporaryFile,
};

use super::{
    load_config, organization_id, required, runtime, signing_facade, until_cancelled, TokenArgs,
};
use crate::cli::{output, Cli, OutputFormat};

const STDIN: &str = "-";
const BUILD_SETTINGS_NAME: &str = "build-settings.json";

/// Submit an artifact for signing
#[derive(Debug, Args)]
pub struct SubmitCommand {
    #[command(flatten)]
    pub token: TokenArgs,

    /// Organization id (UUID)
    #[arg(long)]
    pub organization_id: Option<Uuid>,

    /// Project slug
    #[arg(long)]
    pub project: Option<String>,

    /// Signing policy slug
    #[arg(long)]
    pub signing_policy: Option<String>,

    /// Artifact configuration slug
    #[arg(long)]
    pub artifact_configuration: Option<String>,

    /// Description shown in the signing service
    #[arg(long)]
    pub description: Option<String>,

    /// Artifact to sign, or `-` to read it from stdin
    #[arg(long)]
    pub artifact: PathBuf,

    /// File name for an artifact read from stdin
    #[arg(long)]
    pub artifact_name: Option<String>,

    #[command(flatten)]
    pub origin: OriginArgs,

    /// Wait for the signing request to complete and download the result
    #[arg(long, requires = "output")]
    pub wait: bool,

    /// Where to write the signed artifact
    #[arg(short, long, requires = "wait")]
    pub output: Option<PathBuf>,
}

/// Build and repository provenance, defaulting to common CI variables
#[derive(Debug, Args)]
pub struct OriginArgs {
    /// URL of the build that produced the artifact
    #[arg(long, env = "BUILD_URL", default_value = "")]
    pub build_url: String,

    /// Build settings file attached to the request
    #[arg(long)]
    pub build_settings_file: Option<PathBuf>,

    /// Branch the build ran on
    #[arg(long, env = "GIT_BRANCH", default_value = "")]
    pub branch: String,

    /// Commit the artifact was built from
    #[arg(long, env = "GIT_COMMIT", default_value = "")]
    pub commit: String,

    /// Repository URL
    #[arg(long, env = "GIT_URL", default_value = "")]
    pub repository_url: String,

    /// Source control system
    #[arg(long, default_value = "git")]
    pub scm_type: String,
}

impl SubmitCommand {
    /// Execute the submit command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            artifact = %self.artifact.display(),
            wait = self.wait,
            "executing submit command"
        );
        let (config, _) = load_config(cli)?;
        let facade = signing_facade(&config, &self.token.token)?;

        let staged_artifact = self.stage_artifact(&mut std::io::stdin().lock())?;
        let artifact = staged_artifact
            .as_ref()
            .map(|file| file.path().to_path_buf())
            .unwrap_or_else(|| self.artifact.clone());

        let (settings, _staged_settings) = match &self.origin.build_settings_file {
            Some(path) => (path.clone(), None),
            None => {
                let file = self.stage_build_settings(&config)?;
                (file.path().to_path_buf(), Some(file))
            }
        };

        let request = self.request(&config, artifact, settings)?;

        let rt = runtime()?;
        rt.block_on(until_cancelled(self.submit(cli, facade.as_ref(), &request)))
    }

    async fn submit(
        &self,
        cli: &Cli,
        facade: &dyn SigningFacade,
        request: &SigningRequest,
    ) -> anyhow::Result<()> {
        match &self.output {
            Some(destination) if self.wait => {
                let mut signed = facade.submit_signing_request(request).await?;
                let bytes = signed.persist_to(destination)?;
                signed.release();
                report_signed(cli, request, destination, bytes)
            }
            _ => {
                let id = facade.submit_signing_request_async(request).await?;
                report_submitted(cli, request, &id.to_string())
            }
        }
    }

    /// Copy an artifact piped on stdin into a temporary file with its real name
    fn stage_artifact<R: Read>(&self, stdin: &mut R) -> anyhow::Result<Option<TemporaryFile>> {
        if self.artifact.as_os_str() != STDIN {
            return Ok(None);
        }
        let Some(name) = &self.artifact_name else {
            anyhow::bail!("--artifact-name is required when reading the artifact from stdin");
        };

        let file = TemporaryFile::named(name)?;
        let bytes = file.copy_from(stdin)?;
        info!(name = %name, bytes, "staged artifact from stdin");
        Ok(Some(file))
    }

    /// Write the submission settings to a file attached as build settings
    fn stage_build_settings(&self, config: &Config) -> anyhow::Result<TemporaryFile> {
        let settings = serde_json::json!({
            "project": self.project.as_deref().or(config.defaults.project.as_deref()),
            "signing_policy": self.signing_policy.as_deref().or(config.defaults.signing_policy.as_deref()),
            "artifact_configuration": self
                .artifact_configuration
                .as_deref()
                .or(config.defaults.artifact_configuration.as_deref()),
            "build_url": self.origin.build_url,
            "tool": concat!("signbridge ", env!("CARGO_PKG_VERSION")),
        });

        let file = TemporaryFile::named(BUILD_SETTINGS_NAME)?;
        file.copy_from(&mut serde_json::to_vec_pretty(&settings)?.as_slice())?;
        Ok(file)
    }

    fn request(
        &self,
        config: &Config,
        artifact: PathBuf,
        build_settings_file: PathBuf,
    ) -> anyhow::Result<SigningRequest> {
        let defaults = &config.defaults;
        let organization_id = organization_id(self.organization_id, config)?;
        let project = required(self.project.as_deref(), defaults.project.as_deref(), "project")?;
        let signing_policy = required(
            self.signing_policy.as_deref(),
            defaults.signing_policy.as_deref(),
            "signing_policy",
        )?;

        let origin = SigningRequestOrigin {
            build_url: self.origin.build_url.clone(),
            build_settings_file,
            repository: RepositoryMetadata {
                branch_name: self.origin.branch.clone(),
                commit_id: self.origin.commit.clone(),
                repository_url: self.origin.repository_url.clone(),
                source_control_management_type: self.origin.scm_type.clone(),
            },
        };

        let mut request =
            SigningRequest::new(organization_id, project, signing_policy, artifact, origin);
        if let Some(slug) = self
            .artifact_configuration
            .as_deref()
            .or(defaults.artifact_configuration.as_deref())
        {
            request = request.with_artifact_configuration(slug);
        }
        if let Some(description) = &self.description {
            request = request.with_description(description);
        }
        Ok(request)
    }
}

fn report_submitted(cli: &Cli, request: &SigningRequest, id: &str) -> anyhow::Result<()> {
    match cli.format {
        OutputFormat::Json => output::json(&serde_json::json!({
            "organization_id": request.organization_id,
            "signing_request_id": id,
        })),
        OutputFormat::Text => {
            if cli.quiet {
                println!("{}", id);
            } else {
                output::success("Signing request submitted");
                let styled = output::id_style().apply_to(id).to_string();
                println!("{}", output::key_value("Signing request", &styled));
                println!("{}", output::key_value("Project", &request.project_slug));
                println!(
                    "{}",
                    output::key_value("Signing policy", &request.signing_policy_slug)
                );
            }
            Ok(())
        }
    }
}

fn report_signed(
    cli: &Cli,
    request: &SigningRequest,
    destination: &Path,
    bytes: u64,
) -> anyhow::Result<()> {
    match cli.format {
        OutputFormat::Json => output::json(&serde_json::json!({
            "organization_id": request.organization_id,
            "output": destination,
            "bytes": bytes,
        })),
        OutputFormat::Text => {
            if !cli.quiet {
                output::success(&format!(
                    "Signed artifact written to {} ({} bytes)",
                    output::path_style().apply_to(destination.display()),
                    style(bytes).bold()
                ));
            }
            Ok(())
        }
    }
}
