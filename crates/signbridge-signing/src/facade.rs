//! Signing facade: submits signing requests and fetches signed artifacts
//!
//! Every operation is the same short pipeline: build a command, run it on the
//! [`SigningBackend`] with the configured process timeout, then interpret the
//! output. Nothing is retried here; polling and retry policy belong to the
//! caller.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cleanup::CleanupRegistry;
use crate::command::{BackendCommand, CommandBuilder, Substitution};
use crate::error::{Result, SigningError};
use crate::executor::SigningBackend;
use crate::model::{absolute, ApiConfiguration, Credentials, SigningRequest, SigningRequestId};
use crate::output::parse_signing_request_id;
use crate::temp::TemporaryFile;

/// Cmdlet that creates a signing request
pub const SUBMIT_SIGNING_REQUEST: &str = "Submit-SigningRequest";

/// Cmdlet that downloads the artifact of a finished signing request
pub const GET_SIGNED_ARTIFACT: &str = "Get-SignedArtifact";

const TOKEN_FRAGMENT: &str = "-CIUserToken $env:CIUserToken";

const ORIGIN_FRAGMENT: &str = concat!(
    "-Origin @{'BuildData' = @{",
    "'Url' = \"$($env:BuildUrl)\"; ",
    "'BuildSettingsFile' = \"$($env:BuildSettingsFile)\";",
    "}; ",
    "'RepositoryData' = @{",
    "'BranchName' = \"$($env:BranchName)\"; ",
    "'CommitId' = \"$($env:CommitId)\"; ",
    "'Url' = \"$($env:RepositoryUrl)\"; ",
    "'SourceControlManagementType' = \"$($env:SourceControlManagementType)\"",
    "}}"
);

/// Operations offered by a remote signing service
#[async_trait::async_trait]
pub trait SigningFacade: Send + Sync {
    /// Submit a signing request and wait until the signed artifact is downloaded.
    ///
    /// The returned file belongs to the caller.
    async fn submit_signing_request(&self, request: &SigningRequest) -> Result<TemporaryFile>;

    /// Submit a signing request and return its id without waiting
    async fn submit_signing_request_async(
        &self,
        request: &SigningRequest,
    ) -> Result<SigningRequestId>;

    /// Download the signed artifact of an earlier request.
    ///
    /// Fails if the request has not completed; the caller decides whether to poll again.
    async fn get_signed_artifact(
        &self,
        organization_id: Uuid,
        signing_request_id: SigningRequestId,
    ) -> Result<TemporaryFile>;
}

/// [`SigningFacade`] driving the signing PowerShell module through a [`SigningBackend`]
pub struct PowerShellSigningFacade {
    backend: Arc<dyn SigningBackend>,
    credentials: Credentials,
    api: ApiConfiguration,
    registry: Arc<CleanupRegistry>,
}

impl PowerShellSigningFacade {
    /// Create a facade bound to one set of credentials
    pub fn new(
        backend: Arc<dyn SigningBackend>,
        credentials: Credentials,
        api: ApiConfiguration,
    ) -> Self {
        Self {
            backend,
            credentials,
            api,
            registry: CleanupRegistry::global(),
        }
    }

    /// Track output files in `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<CleanupRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Run a command and return its standard output
    async fn execute_checked(&self, command: &BackendCommand) -> Result<String> {
        let result = self
            .backend
            .execute(command, self.api.process_timeout())
            .await?;

        if !result.success {
            let description = result
                .error_description
                .unwrap_or_else(|| "no error description available".to_string());
            warn!(
                backend = self.backend.name(),
                timed_out = result.timed_out,
                error = %description,
                "signing module call failed"
            );
            return Err(SigningError::FacadeCall(format!(
                "backend call failed: {}",
                description
            )));
        }

        info!(backend = self.backend.name(), "signing module ran successfully");
        Ok(result.stdout)
    }

    /// Run a command that writes into `output`, releasing it if anything goes wrong
    async fn execute_into(
        &self,
        command: &BackendCommand,
        mut output: TemporaryFile,
    ) -> Result<TemporaryFile> {
        let outcome = match self.execute_checked(command).await {
            Ok(_) => ensure_written(&output),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(output),
            Err(e) => {
                output.release();
                Err(e)
            }
        }
    }

    fn submit_command(
        &self,
        request: &SigningRequest,
        output: Option<&TemporaryFile>,
    ) -> BackendCommand {
        let mut builder = CommandBuilder::new(SUBMIT_SIGNING_REQUEST);
        builder
            .append_parameter("ApiUrl", self.api.api_url.as_str())
            .append_custom(TOKEN_FRAGMENT, [self.token_substitution()])
            .append_parameter("OrganizationId", &request.organization_id.to_string())
            .append_parameter(
                "InputArtifactPath",
                &request.artifact_path().to_string_lossy(),
            )
            .append_parameter("ProjectSlug", &request.project_slug)
            .append_parameter("SigningPolicySlug", &request.signing_policy_slug);

        if let Some(slug) = &request.artifact_configuration_slug {
            builder.append_parameter("ArtifactConfigurationSlug", slug);
        }
        if let Some(description) = &request.description {
            builder.append_parameter("Description", description);
        }

        builder
            .append_parameter(
                "ServiceUnavailableTimeoutInSeconds",
                &self.api.service_unavailable_timeout_secs.to_string(),
            )
            .append_parameter(
                "UploadAndDownloadRequestTimeoutInSeconds",
                &self.api.upload_and_download_request_timeout_secs.to_string(),
            );

        let origin = &request.origin;
        let repository = &origin.repository;
        builder.append_custom(
            ORIGIN_FRAGMENT,
            [
                Substitution::new("BuildUrl", origin.build_url.as_str()),
                Substitution::new(
                    "BuildSettingsFile",
                    format!("@{}", absolute(&origin.build_settings_file).display()),
                ),
                Substitution::new("BranchName", repository.branch_name.as_str()),
                Substitution::new("CommitId", repository.commit_id.as_str()),
                Substitution::new("RepositoryUrl", repository.repository_url.as_str()),
                Substitution::new(
                    "SourceControlManagementType",
                    repository.source_control_management_type.as_str(),
                ),
            ],
        );

        if let Some(output) = output {
            builder
                .append_flag("WaitForCompletion")
                .append_parameter("OutputArtifactPath", &output.path().to_string_lossy())
                .append_parameter(
                    "WaitForCompletionTimeoutInSeconds",
                    &self.api.wait_for_completion_timeout_secs.to_string(),
                )
                .append_flag("Force");
        }

        builder.append_flag("Verbose").build()
    }

    fn get_signed_artifact_command(
        &self,
        organization_id: Uuid,
        signing_request_id: SigningRequestId,
        output: &TemporaryFile,
    ) -> BackendCommand {
        CommandBuilder::new(GET_SIGNED_ARTIFACT)
            .append_parameter("ApiUrl", self.api.api_url.as_str())
            .append_custom(TOKEN_FRAGMENT, [self.token_substitution()])
            .append_parameter("OrganizationId", &organization_id.to_string())
            .append_parameter("SigningRequestId", &signing_request_id.to_string())
            .append_parameter(
                "ServiceUnavailableTimeoutInSeconds",
                &self.api.service_unavailable_timeout_secs.to_string(),
            )
            .append_parameter(
                "UploadAndDownloadRequestTimeoutInSeconds",
                &self.api.upload_and_download_request_timeout_secs.to_string(),
            )
            .append_parameter("OutputArtifactPath", &output.path().to_string_lossy())
            .append_parameter(
                "WaitForCompletionTimeoutInSeconds",
                &self.api.wait_for_completion_timeout_secs.to_string(),
            )
            .append_flag("Force")
            .append_flag("Verbose")
            .build()
    }

    fn token_substitution(&self) -> Substitution {
        Substitution::new("CIUserToken", self.credentials.expose())
    }
}

#[async_trait::async_trait]
impl SigningFacade for PowerShellSigningFacade {
    #[instrument(skip_all, fields(project = %request.project_slug, policy = %request.signing_policy_slug))]
    async fn submit_signing_request(&self, request: &SigningRequest) -> Result<TemporaryFile> {
        request.validate()?;
        let output = TemporaryFile::new_in(Arc::clone(&self.registry))?;
        let command = self.submit_command(request, Some(&output));

        info!(artifact = %request.artifact.display(), "submitting signing request and waiting for completion");
        let output = self.execute_into(&command, output).await?;
        info!(path = %output.path().display(), "signed artifact downloaded");
        Ok(output)
    }

    #[instrument(skip_all, fields(project = %request.project_slug, policy = %request.signing_policy_slug))]
    async fn submit_signing_request_async(
        &self,
        request: &SigningRequest,
    ) -> Result<SigningRequestId> {
        request.validate()?;
        let command = self.submit_command(request, None);

        info!(artifact = %request.artifact.display(), "submitting signing request");
        let output = self.execute_checked(&command).await?;
        let id = parse_signing_request_id(&output)?;
        info!(signing_request_id = %id, "signing request submitted");
        Ok(id)
    }

    #[instrument(skip_all, fields(organization_id = %organization_id, signing_request_id = %signing_request_id))]
    async fn get_signed_artifact(
        &self,
        organization_id: Uuid,
        signing_request_id: SigningRequestId,
    ) -> Result<TemporaryFile> {
        let output = TemporaryFile::new_in(Arc::clone(&self.registry))?;
        let command = self.get_signed_artifact_command(organization_id, signing_request_id, &output);

        info!("fetching signed artifact");
        let output = self.execute_into(&command, output).await?;
        info!(path = %output.path().display(), "signed artifact downloaded");
        Ok(output)
    }
}

/// A successful call must have left an artifact behind
fn ensure_written(output: &TemporaryFile) -> Result<()> {
    let len = std::fs::metadata(output.path()).map(|m| m.len()).unwrap_or(0);
    if len == 0 {
        return Err(SigningError::FacadeCall(format!(
            "signing module reported success but wrote no artifact to {}",
            output.path().display()
        )));
    }
    Ok(())
}

/// Creates facades bound to a set of credentials
pub trait SigningFacadeFactory: Send + Sync {
    /// Create a facade that authenticates with `credentials`
    fn create(&self, credentials: Credentials) -> Result<Arc<dyn SigningFacade>>;
}

/// Factory for [`PowerShellSigningFacade`]s sharing one backend and API configuration
pub struct PowerShellSigningFacadeFactory {
    backend: Arc<dyn SigningBackend>,
    api: ApiConfiguration,
    registry: Arc<CleanupRegistry>,
}

impl PowerShellSigningFacadeFactory {
    /// Create a factory; fails if the API configuration is inconsistent
    pub fn new(backend: Arc<dyn SigningBackend>, api: ApiConfiguration) -> Result<Self> {
        api.validate()?;
        Ok(Self {
            backend,
            api,
            registry: CleanupRegistry::global(),
        })
    }

    /// Track output files in `registry` instead of the process-wide one
    pub fn with_registry(mut self, registry: Arc<CleanupRegistry>) -> Self {
        self.registry = registry;
        self
    }
}

impl SigningFacadeFactory for PowerShellSigningFacadeFactory {
    fn create(&self, credentials: Credentials) -> Result<Arc<dyn SigningFacade>> {
        if credentials.is_empty() {
            return Err(SigningError::Configuration(
                "an API token is required".to_string(),
            ));
        }
        let facade = PowerShellSigningFacade::new(
            Arc::clone(&self.backend),
            credentials,
            self.api.clone(),
        )
        .with_registry(Arc::clone(&self.registry));
        Ok(Arc::new(facade))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutionResult;
    use crate::model::{RepositoryMetadata, SigningRequestOrigin};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    const TOKEN: &str = "ci-user-token-0123456789";
    const BRANCH: &str = "feature/\"; Remove-Item C:\\ -Recurse; \"";

    enum Response {
        Succeed {
            output: String,
            artifact: Option<Vec<u8>>,
        },
        Fail(String),
        Finished(ExecutionResult),
        SpawnError,
    }

    /// In-memory backend returning canned responses and recording every call
    #[derive(Default)]
    struct ScriptedBackend {
        responses: Mutex<VecDeque<Response>>,
        calls: Mutex<Vec<(BackendCommand, Duration)>>,
    }

    impl ScriptedBackend {
        fn with(responses: Vec<Response>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(BackendCommand, Duration)> {
            self.calls.lock().clone()
        }
    }

    fn output_artifact_path(command: &BackendCommand) -> Option<PathBuf> {
        let text = command.text();
        let start = text.find("-OutputArtifactPath \"")? + "-OutputArtifactPath \"".len();
        let end = text[start..].find('"')? + start;
        Some(PathBuf::from(&text[start..end]))
    }

    #[async_trait::async_trait]
    impl SigningBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn execute(
            &self,
            command: &BackendCommand,
            timeout: Duration,
        ) -> Result<ExecutionResult> {
            self.calls.lock().push((command.clone(), timeout));
            let response = self
                .responses
                .lock()
                .pop_front()
                .expect("unexpected backend call");

            match response {
                Response::Succeed { output, artifact } => {
                    if let Some(bytes) = artifact {
                        let path = output_artifact_path(command).expect("no output path");
                        std::fs::write(path, bytes)?;
                    }
                    Ok(ExecutionResult::succeeded(output))
                }
                Response::Fail(description) => Ok(ExecutionResult::failed("", description)),
                Response::Finished(result) => Ok(result),
                Response::SpawnError => Err(SigningError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "pwsh not found",
                ))),
            }
        }
    }

    struct Fixture {
        _dir: TempDir,
        request: SigningRequest,
        registry: Arc<CleanupRegistry>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("app.exe");
        std::fs::write(&artifact, b"MZ unsigned").unwrap();
        let settings = dir.path().join("settings.xml");
        std::fs::write(&settings, b"<project/>").unwrap();

        let origin = SigningRequestOrigin {
            build_url: "https://ci.example.com/job/app/42/".to_string(),
            build_settings_file: settings,
            repository: RepositoryMetadata {
                branch_name: BRANCH.to_string(),
                commit_id: "0f1e2d3c4b5a".to_string(),
                repository_url: "https://git.example.com/app.git".to_string(),
                source_control_management_type: "git".to_string(),
            },
        };
        let request = SigningRequest::new(
            Uuid::parse_str("b6f1c1a2-0000-4000-8000-000000000001").unwrap(),
            "app",
            "release-signing",
            artifact,
            origin,
        );

        Fixture {
            _dir: dir,
            request,
            registry: Arc::new(CleanupRegistry::new()),
        }
    }

    fn api() -> ApiConfiguration {
        ApiConfiguration::new(url::Url::parse("https://signing.example.com/Api/").unwrap())
            .with_process_timeout(900)
            .with_service_unavailable_timeout(120)
            .with_upload_and_download_timeout(60)
            .with_completion_timeout(600)
    }

    fn facade(backend: &Arc<ScriptedBackend>, registry: &Arc<CleanupRegistry>) -> PowerShellSigningFacade {
        let backend: Arc<dyn SigningBackend> = backend.clone();
        PowerShellSigningFacade::new(backend, Credentials::new(TOKEN), api())
            .with_registry(Arc::clone(registry))
    }

    fn substitution<'a>(command: &'a BackendCommand, name: &str) -> Option<&'a str> {
        command
            .substitutions()
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.value())
    }

    #[tokio::test]
    async fn test_submit_signing_request_returns_signed_artifact() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Succeed {
            output: "VERBOSE: done".to_string(),
            artifact: Some(b"MZ signed".to_vec()),
        }]);

        let mut signed = facade(&backend, &fx.registry)
            .submit_signing_request(&fx.request)
            .await
            .unwrap();

        assert_eq!(std::fs::read(signed.path()).unwrap(), b"MZ signed");
        assert_eq!(fx.registry.pending(), 1);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        let (command, timeout) = &calls[0];
        assert_eq!(*timeout, Duration::from_secs(900));

        let text = command.text();
        assert!(text.starts_with("Submit-SigningRequest -ApiUrl \"https://signing.example.com/Api/\""));
        assert!(text.contains(" -CIUserToken $env:CIUserToken"));
        assert!(text.contains(" -OrganizationId \"b6f1c1a2-0000-4000-8000-000000000001\""));
        assert!(text.contains(" -ProjectSlug \"app\" -SigningPolicySlug \"release-signing\""));
        assert!(text.contains(" -ServiceUnavailableTimeoutInSeconds \"120\""));
        assert!(text.contains(" -UploadAndDownloadRequestTimeoutInSeconds \"60\""));
        assert!(text.contains(" -WaitForCompletion -OutputArtifactPath \""));
        assert!(text.contains(" -WaitForCompletionTimeoutInSeconds \"600\" -Force -Verbose"));
        assert!(text.ends_with(" -Verbose"));
        assert!(!text.contains("ArtifactConfigurationSlug"));
        assert!(!text.contains("-Description"));

        signed.release();
        signed.release();
        assert_eq!(fx.registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_secrets_and_origin_travel_out_of_band() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Succeed {
            output: "3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string(),
            artifact: None,
        }]);

        facade(&backend, &fx.registry)
            .submit_signing_request_async(&fx.request)
            .await
            .unwrap();

        let (command, _) = &backend.calls()[0];
        let text = command.text();
        assert!(!text.contains(TOKEN));
        assert!(!text.contains(BRANCH));
        assert!(!text.contains("0f1e2d3c4b5a"));
        assert!(!format!("{:?}", command).contains(TOKEN));

        assert_eq!(substitution(command, "CIUserToken"), Some(TOKEN));
        assert_eq!(substitution(command, "BranchName"), Some(BRANCH));
        assert_eq!(substitution(command, "CommitId"), Some("0f1e2d3c4b5a"));
        assert_eq!(
            substitution(command, "BuildUrl"),
            Some("https://ci.example.com/job/app/42/")
        );
        assert_eq!(
            substitution(command, "RepositoryUrl"),
            Some("https://git.example.com/app.git")
        );
        assert_eq!(substitution(command, "SourceControlManagementType"), Some("git"));

        let settings = substitution(command, "BuildSettingsFile").unwrap();
        assert!(settings.starts_with('@'));
        assert!(settings.ends_with("settings.xml"));
        assert!(text.contains(ORIGIN_FRAGMENT));
    }

    #[tokio::test]
    async fn test_submit_signing_request_failure_releases_output() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Fail(
            "Signing request was denied".to_string(),
        )]);

        let err = facade(&backend, &fx.registry)
            .submit_signing_request(&fx.request)
            .await
            .unwrap_err();

        assert!(matches!(err, SigningError::FacadeCall(_)));
        assert!(err
            .to_string()
            .contains("backend call failed: Signing request was denied"));
        assert_eq!(fx.registry.pending(), 0);

        let (command, _) = &backend.calls()[0];
        let output = output_artifact_path(command).unwrap();
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_submit_signing_request_without_artifact_is_error() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Succeed {
            output: String::new(),
            artifact: None,
        }]);

        let err = facade(&backend, &fx.registry)
            .submit_signing_request(&fx.request)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("wrote no artifact"));
        assert_eq!(fx.registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_spawn_error_propagates_as_io() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::SpawnError]);

        let err = facade(&backend, &fx.registry)
            .submit_signing_request(&fx.request)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::Io(_)));
        assert_eq!(fx.registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_async_returns_id() {
        let fx = fixture();
        let request = fx
            .request
            .clone()
            .with_artifact_configuration("installer")
            .with_description("Nightly \"$(build)\" `42`");
        let backend = ScriptedBackend::with(vec![Response::Succeed {
            output: "VERBOSE: Submitting\nVERBOSE: Created\n3fa85f64-5717-4562-b3fc-2c963f66afa6\n"
                .to_string(),
            artifact: None,
        }]);

        let id = facade(&backend, &fx.registry)
            .submit_signing_request_async(&request)
            .await
            .unwrap();
        assert_eq!(id.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");

        let (command, _) = &backend.calls()[0];
        let text = command.text();
        assert!(text.contains(" -ArtifactConfigurationSlug \"installer\""));
        assert!(text.contains(" -Description \"Nightly `\"`$(build)`\" ``42``\""));
        assert!(!text.contains("WaitForCompletion"));
        assert!(!text.contains("OutputArtifactPath"));
        assert!(!text.contains("-Force"));
        assert!(text.ends_with("}} -Verbose"));
        assert_eq!(fx.registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_submit_async_ignores_stderr_after_id() {
        let fx = fixture();
        let mut result = ExecutionResult::succeeded(
            "VERBOSE: Created\n3fa85f64-5717-4562-b3fc-2c963f66afa6\nWARNING: slow upload",
        );
        result.stdout = "VERBOSE: Created\n3fa85f64-5717-4562-b3fc-2c963f66afa6".to_string();
        let backend = ScriptedBackend::with(vec![Response::Finished(result)]);

        let id = facade(&backend, &fx.registry)
            .submit_signing_request_async(&fx.request)
            .await
            .unwrap();
        assert_eq!(id.to_string(), "3fa85f64-5717-4562-b3fc-2c963f66afa6");
    }

    #[tokio::test]
    async fn test_submit_async_without_id_is_protocol_error() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Succeed {
            output: "VERBOSE: Submitting\nsomething unexpected".to_string(),
            artifact: None,
        }]);

        let err = facade(&backend, &fx.registry)
            .submit_signing_request_async(&fx.request)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::FacadeCall(_)));
        assert!(err.to_string().contains("no signing request id found"));
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_backend() {
        let fx = fixture();
        let mut request = fx.request.clone();
        request.artifact = PathBuf::from("/nonexistent/app.exe");
        let backend = ScriptedBackend::with(vec![]);

        let err = facade(&backend, &fx.registry)
            .submit_signing_request(&request)
            .await
            .unwrap_err();
        assert!(matches!(err, SigningError::InvalidRequest(_)));
        assert!(backend.calls().is_empty());
        assert_eq!(fx.registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_get_signed_artifact() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Succeed {
            output: "VERBOSE: Downloading".to_string(),
            artifact: Some(b"signed".to_vec()),
        }]);
        let request_id: SigningRequestId = "3fa85f64-5717-4562-b3fc-2c963f66afa6".parse().unwrap();

        let signed = facade(&backend, &fx.registry)
            .get_signed_artifact(fx.request.organization_id, request_id)
            .await
            .unwrap();
        assert_eq!(std::fs::read(signed.path()).unwrap(), b"signed");

        let (command, timeout) = &backend.calls()[0];
        assert_eq!(*timeout, Duration::from_secs(900));
        let path = signed.path().to_string_lossy().to_string();
        assert_eq!(
            command.text(),
            format!(
                "Get-SignedArtifact -ApiUrl \"https://signing.example.com/Api/\" \
                 -CIUserToken $env:CIUserToken \
                 -OrganizationId \"b6f1c1a2-0000-4000-8000-000000000001\" \
                 -SigningRequestId \"3fa85f64-5717-4562-b3fc-2c963f66afa6\" \
                 -ServiceUnavailableTimeoutInSeconds \"120\" \
                 -UploadAndDownloadRequestTimeoutInSeconds \"60\" \
                 -OutputArtifactPath \"{}\" \
                 -WaitForCompletionTimeoutInSeconds \"600\" -Force -Verbose",
                path
            )
        );
        assert_eq!(command.substitution_names(), vec!["CIUserToken"]);
    }

    #[tokio::test]
    async fn test_get_signed_artifact_not_ready() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![Response::Fail(
            "Signing request is not yet completed".to_string(),
        )]);

        let err = facade(&backend, &fx.registry)
            .get_signed_artifact(fx.request.organization_id, Uuid::new_v4().into())
            .await
            .unwrap_err();
        assert!(err.is_backend_failure());
        assert!(err.to_string().contains("not yet completed"));
        assert_eq!(fx.registry.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_independent() {
        let fx = fixture();
        let backend = ScriptedBackend::with(vec![
            Response::Succeed {
                output: String::new(),
                artifact: Some(b"one".to_vec()),
            },
            Response::Succeed {
                output: String::new(),
                artifact: Some(b"two".to_vec()),
            },
        ]);
        let facade = facade(&backend, &fx.registry);

        let (a, b) = tokio::join!(
            facade.get_signed_artifact(fx.request.organization_id, Uuid::new_v4().into()),
            facade.get_signed_artifact(fx.request.organization_id, Uuid::new_v4().into()),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
        assert_eq!(fx.registry.pending(), 2);
    }

    #[test]
    fn test_factory_validates() {
        let backend: Arc<dyn SigningBackend> = ScriptedBackend::with(vec![]);

        let bad = api().with_process_timeout(100);
        assert!(PowerShellSigningFacadeFactory::new(Arc::clone(&backend), bad).is_err());

        let factory = PowerShellSigningFacadeFactory::new(backend, api()).unwrap();
        assert!(factory.create(Credentials::new("")).is_err());
        assert!(factory.create(Credentials::new(TOKEN)).is_ok());
    }
}
