//! Signing request model, credentials and API configuration

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use signbridge_core::config::defaults::{
    DEFAULT_PROCESS_TIMEOUT_SECS, DEFAULT_SERVICE_UNAVAILABLE_TIMEOUT_SECS,
    DEFAULT_UPLOAD_AND_DOWNLOAD_TIMEOUT_SECS, DEFAULT_WAIT_FOR_COMPLETION_TIMEOUT_SECS,
};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, SigningError};

/// Source control metadata for the commit that produced an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    /// Branch the build ran on
    pub branch_name: String,
    /// Commit id
    pub commit_id: String,
    /// Repository URL
    pub repository_url: String,
    /// Source control system (e.g. "git")
    pub source_control_management_type: String,
}

/// Where a signing request comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequestOrigin {
    /// URL of the build that produced the artifact
    pub build_url: String,
    /// File holding the build settings, handed to the backend by reference
    pub build_settings_file: PathBuf,
    /// Repository the build was made from
    pub repository: RepositoryMetadata,
}

/// A request to sign one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningRequest {
    /// Organization that owns the project
    pub organization_id: Uuid,
    /// Project slug
    pub project_slug: String,
    /// Signing policy slug
    pub signing_policy_slug: String,
    /// Artifact configuration slug (project default when absent)
    pub artifact_configuration_slug: Option<String>,
    /// Free-text description shown in the signing service
    pub description: Option<String>,
    /// The artifact to sign
    pub artifact: PathBuf,
    /// Build and repository provenance
    pub origin: SigningRequestOrigin,
}

impl SigningRequest {
    /// Create a new signing request
    pub fn new(
        organization_id: Uuid,
        project_slug: impl Into<String>,
        signing_policy_slug: impl Into<String>,
        artifact: impl Into<PathBuf>,
        origin: SigningRequestOrigin,
    ) -> Self {
        Self {
            organization_id,
            project_slug: project_slug.into(),
            signing_policy_slug: signing_policy_slug.into(),
            artifact_configuration_slug: None,
            description: None,
            artifact: artifact.into(),
            origin,
        }
    }

    /// Set the artifact configuration slug
    pub fn with_artifact_configuration(mut self, slug: impl Into<String>) -> Self {
        self.artifact_configuration_slug = Some(slug.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the request is complete enough to submit
    pub fn validate(&self) -> Result<()> {
        if self.project_slug.trim().is_empty() {
            return Err(SigningError::InvalidRequest(
                "project slug cannot be empty".to_string(),
            ));
        }
        if self.signing_policy_slug.trim().is_empty() {
            return Err(SigningError::InvalidRequest(
                "signing policy slug cannot be empty".to_string(),
            ));
        }
        if self
            .artifact_configuration_slug
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err(SigningError::InvalidRequest(
                "artifact configuration slug cannot be empty".to_string(),
            ));
        }
        if !self.artifact.is_file() {
            return Err(SigningError::InvalidRequest(format!(
                "artifact not found: {}",
                self.artifact.display()
            )));
        }
        Ok(())
    }

    /// Absolute path of the input artifact
    pub(crate) fn artifact_path(&self) -> PathBuf {
        absolute(&self.artifact)
    }
}

/// Make a path absolute against the current directory without touching the filesystem
pub(crate) fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// API token used to authenticate against the signing service
#[derive(Clone)]
pub struct Credentials(SecretString);

impl Credentials {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Whether the token is empty
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials([REDACTED])")
    }
}

/// Endpoint and timeout settings shared by every call a facade makes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfiguration {
    /// Signing service API URL
    pub api_url: Url,
    /// Hard limit for one backend process
    pub wait_for_process_timeout_secs: u64,
    /// Backend retry window while the service is unavailable
    pub service_unavailable_timeout_secs: u64,
    /// Timeout for one upload or download request
    pub upload_and_download_request_timeout_secs: u64,
    /// Backend wait for a signing request to complete
    pub wait_for_completion_timeout_secs: u64,
}

impl ApiConfiguration {
    /// Create a configuration with default timeouts
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            wait_for_process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            service_unavailable_timeout_secs: DEFAULT_SERVICE_UNAVAILABLE_TIMEOUT_SECS,
            upload_and_download_request_timeout_secs: DEFAULT_UPLOAD_AND_DOWNLOAD_TIMEOUT_SECS,
            wait_for_completion_timeout_secs: DEFAULT_WAIT_FOR_COMPLETION_TIMEOUT_SECS,
        }
    }

    /// Set the process timeout
    pub fn with_process_timeout(mut self, seconds: u64) -> Self {
        self.wait_for_process_timeout_secs = seconds;
        self
    }

    /// Set the service-unavailable retry window
    pub fn with_service_unavailable_timeout(mut self, seconds: u64) -> Self {
        self.service_unavailable_timeout_secs = seconds;
        self
    }

    /// Set the upload/download timeout
    pub fn with_upload_and_download_timeout(mut self, seconds: u64) -> Self {
        self.upload_and_download_request_timeout_secs = seconds;
        self
    }

    /// Set the completion-wait timeout
    pub fn with_completion_timeout(mut self, seconds: u64) -> Self {
        self.wait_for_completion_timeout_secs = seconds;
        self
    }

    /// Process timeout as a duration
    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_for_process_timeout_secs)
    }

    /// Check all timeouts are set and the process bound exceeds the completion wait
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("process", self.wait_for_process_timeout_secs),
            ("service unavailable", self.service_unavailable_timeout_secs),
            (
                "upload and download",
                self.upload_and_download_request_timeout_secs,
            ),
            ("completion", self.wait_for_completion_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(SigningError::Configuration(format!(
                    "{} timeout must be greater than zero",
                    name
                )));
            }
        }

        if self.wait_for_process_timeout_secs <= self.wait_for_completion_timeout_secs {
            return Err(SigningError::Configuration(format!(
                "process timeout ({}s) must exceed completion timeout ({}s), \
                 otherwise the process is killed before the backend reports",
                self.wait_for_process_timeout_secs, self.wait_for_completion_timeout_secs
            )));
        }

        Ok(())
    }
}

/// Identifier the signing service assigns to a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningRequestId(Uuid);

impl SigningRequestId {
    /// Wrap a UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for SigningRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SigningRequestId {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| SigningError::InvalidRequest(format!("invalid signing request id: {e}")))
    }
}

impl From<Uuid> for SigningRequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
