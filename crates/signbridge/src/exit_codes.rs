//! Exit codes for the CLI

use signbridge_core::{ConfigError, CoreError};
use signbridge_signing::SigningError;

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// The signing service or module reported a failure
pub const SIGNING_FAILURE: i32 = 3;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// The command was interrupted with Ctrl-C
#[derive(Debug, thiserror::Error)]
#[error("Cancelled")]
pub struct Cancelled;

/// Pick the exit code for an error, looking through its context chain
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if cause.is::<Cancelled>() {
            return CANCELLED;
        }
        if cause.is::<ConfigError>() || cause.is::<CoreError>() {
            return CONFIG_ERROR;
        }
        if let Some(signing) = cause.downcast_ref::<SigningError>() {
            return match signing {
                SigningError::FacadeCall(_) => SIGNING_FAILURE,
                SigningError::Configuration(_) => CONFIG_ERROR,
                _ => ERROR,
            };
        }
    }
    ERROR
}
