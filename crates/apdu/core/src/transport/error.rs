//! Error types specific to card transport

use thiserror::Error;

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection to the card could not be established
    #[error("Failed to connect to card")]
    Connection,

    /// Bytes could not be exchanged with the card
    #[error("Failed to transmit data")]
    Transmission,

    /// No card in the terminal
    #[error("No card present")]
    NoCard,

    /// Card was pulled out while connected
    #[error("Card removed")]
    CardRemoved,

    /// Card was reset by another process
    #[error("Card reset")]
    CardReset,

    /// The transport is not connected to any card
    #[error("Transport not connected")]
    NotConnected,

    /// Driver error (with code)
    #[error("Driver error code: {0:#010X}")]
    Driver(i32),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}
