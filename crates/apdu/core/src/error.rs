//! Core error type for APDU exchanges
//!
//! Everything that can go wrong below the card application layer: the transport
//! failed to move bytes, or the bytes that came back are not a response.

use crate::response::error::ResponseError;
use crate::transport::error::TransportError;

/// Result type for APDU exchanges
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for APDU exchanges
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport failed to exchange bytes with the card
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The card answered with something that is not a valid response
    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl Error {
    /// Check if the card went away underneath the exchange
    pub const fn is_card_gone(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::NoCard | TransportError::CardRemoved)
        )
    }
}
