//! Default configuration values

use super::types::Config;
use crate::error::ConfigError;

/// Default configuration file name (TOML)
pub const DEFAULT_CONFIG_TOML: &str = "signbridge.toml";

/// Default configuration file name (YAML)
pub const DEFAULT_CONFIG_YAML: &str = "signbridge.yaml";

/// Default signing service endpoint
pub const DEFAULT_API_URL: &str = "https://app.signpath.io/Api/";

/// Default PowerShell module providing the signing cmdlets
pub const DEFAULT_MODULE: &str = "SignPath";

/// Outer bound on a single external process
pub const DEFAULT_PROCESS_TIMEOUT_SECS: u64 = 1200;

/// Backend retry window while the service answers 503
pub const DEFAULT_SERVICE_UNAVAILABLE_TIMEOUT_SECS: u64 = 600;

/// Upload/download request timeout
pub const DEFAULT_UPLOAD_AND_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Backend wait for a signing request to finish
pub const DEFAULT_WAIT_FOR_COMPLETION_TIMEOUT_SECS: u64 = 600;

/// Get list of config file names to search for, in priority order
pub fn config_file_names() -> Vec<&'static str> {
    vec![
        DEFAULT_CONFIG_TOML,
        DEFAULT_CONFIG_YAML,
        ".signbridge.toml",
        ".signbridge.yaml",
    ]
}

/// Render the default configuration as TOML
pub fn default_config_toml() -> std::result::Result<String, ConfigError> {
    let body = toml::to_string_pretty(&Config::default())?;
    Ok(format!("{DEFAULT_CONFIG_HEADER}{body}"))
}

const DEFAULT_CONFIG_HEADER: &str = "# signbridge configuration\n\
# The API token is never read from this file; pass --token or set SIGNBRIDGE_TOKEN.\n\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_toml_roundtrips() {
        let rendered = default_config_toml().unwrap();
        assert!(rendered.starts_with("# signbridge configuration"));

        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.api.url, DEFAULT_API_URL);
        assert_eq!(parsed.executor.module, DEFAULT_MODULE);
        assert_eq!(
            parsed.api.wait_for_process_timeout_secs,
            DEFAULT_PROCESS_TIMEOUT_SECS
        );
    }

    #[test]
    fn test_default_timeouts_are_consistent() {
        assert!(DEFAULT_PROCESS_TIMEOUT_SECS > DEFAULT_WAIT_FOR_COMPLETION_TIMEOUT_SECS);
    }
}
