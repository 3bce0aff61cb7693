//! Configuration types

use serde::{Deserialize, Serialize};

use super::defaults::{
    DEFAULT_API_URL, DEFAULT_MODULE, DEFAULT_PROCESS_TIMEOUT_SECS,
    DEFAULT_SERVICE_UNAVAILABLE_TIMEOUT_SECS, DEFAULT_UPLOAD_AND_DOWNLOAD_TIMEOUT_SECS,
    DEFAULT_WAIT_FOR_COMPLETION_TIMEOUT_SECS,
};

/// Main configuration for signbridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Version of the config schema
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Signing service endpoint and timeouts
    pub api: ApiConfig,

    /// How the external signing module is invoked
    pub executor: ExecutorConfig,

    /// Request values used when not given on the command line
    pub defaults: RequestDefaults,
}

/// Signing service API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the signing service API
    pub url: String,

    /// Hard limit for the whole external process, in seconds
    pub wait_for_process_timeout_secs: u64,

    /// How long the backend keeps retrying while the service is unavailable
    pub service_unavailable_timeout_secs: u64,

    /// Timeout for a single upload or download request
    pub upload_and_download_request_timeout_secs: u64,

    /// How long the backend waits for a signing request to complete
    pub wait_for_completion_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_API_URL.to_string(),
            wait_for_process_timeout_secs: DEFAULT_PROCESS_TIMEOUT_SECS,
            service_unavailable_timeout_secs: DEFAULT_SERVICE_UNAVAILABLE_TIMEOUT_SECS,
            upload_and_download_request_timeout_secs: DEFAULT_UPLOAD_AND_DOWNLOAD_TIMEOUT_SECS,
            wait_for_completion_timeout_secs: DEFAULT_WAIT_FOR_COMPLETION_TIMEOUT_SECS,
        }
    }
}

/// External signing module invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Interpreter binary (e.g. "pwsh" or "powershell")
    pub program: String,

    /// Arguments placed before the generated script
    pub args: Vec<String>,

    /// Module imported before every command
    pub module: String,

    /// Treat any error-stream output as a failed call
    pub fail_on_stderr: bool,

    /// Output lines starting with this marker signal a failed call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_marker: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: "pwsh".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
            ],
            module: DEFAULT_MODULE.to_string(),
            fail_on_stderr: true,
            error_marker: None,
        }
    }
}

/// Request defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    /// Organization id (UUID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    /// Project slug
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Signing policy slug
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_policy: Option<String>,

    /// Artifact configuration slug
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_configuration: Option<String>,
}
