//! Interpretation of backend output.
//!
//! The signing module returns values by writing them as the last line of its
//! output; everything before that is progress logging.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::{Result, SigningError};
use crate::model::SigningRequestId;

static UUID_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("UUID line pattern is valid")
});

/// The return value line: the last line with any non-whitespace content
pub fn return_value(output: &str) -> Option<&str> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
}

/// Extract the signing request id the backend printed as its return value
pub fn parse_signing_request_id(output: &str) -> Result<SigningRequestId> {
    let line = return_value(output)
        .filter(|line| UUID_LINE.is_match(line))
        .ok_or_else(|| {
            SigningError::FacadeCall(
                "unexpected output from the signing module, no signing request id found"
                    .to_string(),
            )
        })?;

    Uuid::parse_str(line)
        .map(SigningRequestId::new)
        .map_err(|e| SigningError::FacadeCall(format!("malformed signing request id: {e}")))
}
