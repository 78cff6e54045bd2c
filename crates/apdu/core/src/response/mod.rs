//! APDU response definitions
//!
//! A response is whatever the card sent back, split into the data bytes and the
//! trailing two status bytes.

pub mod error;
pub mod status;

use bytes::Bytes;
use tracing::trace;

use error::ResponseError;
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data
    payload: Option<Bytes>,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(data: &Bytes) -> Result<Self, ResponseError> {
        if data.len() < 2 {
            return Err(ResponseError::Incomplete(data.len()));
        }

        let split = data.len() - 2;
        let status = StatusWord::new(data[split], data[split + 1]);
        let payload = (split > 0).then(|| data.slice(..split));

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = split,
            "Parsed APDU response"
        );

        Ok(Self { payload, status })
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Take the payload, empty when the card sent no data
    pub fn into_payload(self) -> Bytes {
        self.payload.unwrap_or_default()
    }
}
