//! Error types for identity card operations

use bytes::Bytes;
use eid_apdu_core::{ResponseError, StatusWord, TransportError};

use crate::commands::{ElementaryFile, Operation};

/// Result type for identity card operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to an identity card
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The ATR matches none of the known card generations
    #[error("Unrecognized card, ATR {}", hex::encode_upper(atr))]
    UnrecognizedCard {
        /// ATR of the rejected card
        atr: Bytes,
    },

    /// The card answered a command with a status other than 90 00
    #[error("{operation} failed with status {status} ({})", status.description())]
    Protocol {
        /// Command that failed
        operation: Operation,
        /// Status word returned by the card
        status: StatusWord,
    },

    /// The file header is blank, the card does not carry this file
    #[error("Elementary file {file} is missing on the card")]
    MissingFile {
        /// File that was read
        file: ElementaryFile,
    },

    /// The card stopped returning data before the announced file length
    #[error("Short read of {file}: expected {expected} more bytes at offset {offset}")]
    ShortRead {
        /// File that was read
        file: ElementaryFile,
        /// Offset of the read that came back empty
        offset: usize,
        /// Bytes still missing
        expected: usize,
    },

    /// A record declares more value bytes than the file holds
    #[error("Malformed record: tag {tag} declares {declared} bytes but only {remaining} remain")]
    MalformedRecord {
        /// Tag of the offending record
        tag: u16,
        /// Declared value length
        declared: usize,
        /// Bytes left after the record header
        remaining: usize,
    },

    /// Operation on a card session that was already disconnected
    #[error("Card session is not connected")]
    NotConnected,

    /// Photo bytes are not a JPEG stream
    #[error("Photo is not a JPEG image")]
    InvalidPhoto,

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Response could not be parsed
    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl From<eid_apdu_core::Error> for Error {
    fn from(error: eid_apdu_core::Error) -> Self {
        match error {
            eid_apdu_core::Error::Transport(e) => Self::Transport(e),
            eid_apdu_core::Error::Response(e) => Self::Response(e),
        }
    }
}

impl Error {
    /// Convert a transport's own error type
    pub(crate) fn transport<E: Into<eid_apdu_core::Error>>(error: E) -> Self {
        Self::from(error.into())
    }

    /// Whether the error means the card channel itself is faulting
    ///
    /// The presence monitor drops the session and reconnects on these. Status words,
    /// short reads and bad records come from a working channel and leave the session
    /// alone.
    pub const fn is_transport_fault(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Response(_))
    }
}
