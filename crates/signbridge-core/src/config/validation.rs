//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_api(config)?;
    validate_executor(config)?;
    validate_defaults(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_api(config: &Config) -> Result<()> {
    let api = &config.api;

    match url::Url::parse(&api.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(_) => {
            return Err(ConfigError::invalid("api.url", "must be an http(s) URL").into());
        }
        Err(e) => {
            return Err(ConfigError::invalid("api.url", e.to_string()).into());
        }
    }

    let timeouts = [
        (
            "api.wait_for_process_timeout_secs",
            api.wait_for_process_timeout_secs,
        ),
        (
            "api.service_unavailable_timeout_secs",
            api.service_unavailable_timeout_secs,
        ),
        (
            "api.upload_and_download_request_timeout_secs",
            api.upload_and_download_request_timeout_secs,
        ),
        (
            "api.wait_for_completion_timeout_secs",
            api.wait_for_completion_timeout_secs,
        ),
    ];
    for (field, value) in timeouts {
        if value == 0 {
            return Err(ConfigError::invalid(field, "must be greater than zero").into());
        }
    }

    // The process bound wraps the backend's own completion wait
    if api.wait_for_process_timeout_secs <= api.wait_for_completion_timeout_secs {
        return Err(ConfigError::invalid(
            "api.wait_for_process_timeout_secs",
            format!(
                "must be greater than api.wait_for_completion_timeout_secs ({})",
                api.wait_for_completion_timeout_secs
            ),
        )
        .into());
    }

    Ok(())
}

fn validate_executor(config: &Config) -> Result<()> {
    let executor = &config.executor;

    if executor.program.trim().is_empty() {
        return Err(ConfigError::invalid("executor.program", "program cannot be empty").into());
    }

    if executor.module.trim().is_empty() {
        return Err(ConfigError::invalid("executor.module", "module cannot be empty").into());
    }

    if let Some(marker) = &executor.error_marker {
        if marker.trim().is_empty() {
            return Err(ConfigError::invalid(
                "executor.error_marker",
                "marker cannot be blank; remove it to disable marker detection",
            )
            .into());
        }
    }

    Ok(())
}

fn validate_defaults(config: &Config) -> Result<()> {
    if let Some(org) = &config.defaults.organization_id {
        if uuid::Uuid::parse_str(org).is_err() {
            return Err(ConfigError::invalid(
                "defaults.organization_id",
                format!("'{}' is not a valid UUID", org),
            )
            .into());
        }
    }

    let slugs = [
        ("defaults.project", &config.defaults.project),
        ("defaults.signing_policy", &config.defaults.signing_policy),
        (
            "defaults.artifact_configuration",
            &config.defaults.artifact_configuration,
        ),
    ];
    for (field, value) in slugs {
        if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
            return Err(ConfigError::invalid(field, "slug cannot be empty").into());
        }
    }

    Ok(())
}
