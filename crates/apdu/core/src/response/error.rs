//! Error types specific to APDU responses

use thiserror::Error;

/// Errors raised while interpreting raw response bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// Fewer than the two status bytes came back
    #[error("Incomplete response: {0} bytes, status word needs 2")]
    Incomplete(usize),
}
