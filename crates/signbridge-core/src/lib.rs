//! signbridge Core - configuration and shared error types
//!
//! This crate provides the configuration file format, discovery, loading and
//! validation used by the signbridge CLI to set up the signing facade.

pub mod config;
pub mod error;

pub use config::{
    find_config, load_config, load_config_or_default, validate_config,
    ApiConfig, Config, ExecutorConfig, RequestDefaults,
};
pub use error::{ConfigError, CoreError, Result};
