//! Error types for PC/SC transport

use eid_apdu_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// Operation on a transport whose card connection is closed
    #[error("Not connected to a card in reader: {0}")]
    NotConnected(String),
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(e) => match e {
                pcsc::Error::NoSmartcard => Self::NoCard,
                pcsc::Error::RemovedCard => Self::CardRemoved,
                pcsc::Error::ResetCard => Self::CardReset,
                pcsc::Error::NoService
                | pcsc::Error::ServiceStopped
                | pcsc::Error::NoReadersAvailable
                | pcsc::Error::ReaderUnavailable
                | pcsc::Error::UnknownReader => Self::Connection,
                e => Self::Driver(e as u32 as i32),
            },
            PcscError::NoCard(_) => Self::NoCard,
            PcscError::NotConnected(_) => Self::NotConnected,
            e @ (PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_)) => {
                Self::other(e.to_string())
            }
        }
    }
}

impl From<PcscError> for eid_apdu_core::Error {
    fn from(error: PcscError) -> Self {
        Self::Transport(error.into())
    }
}
