//! Commands understood by the identity card
//!
//! Every helper sends one APDU and fails with [`Error::Protocol`] unless the card
//! answers 90 00.

use bytes::Bytes;
use eid_apdu_core::{CardTransport, Command};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

/// Largest number of bytes a single READ BINARY may request
pub const MAX_READ_LENGTH: u8 = 0xFF;

/// Application identifier of the identity application on Gemalto and SmartCafe cards
pub const IDENTITY_AID: [u8; 11] = [
    0xF3, 0x81, 0x00, 0x00, 0x02, 0x53, 0x45, 0x52, 0x49, 0x44, 0x01,
];

/// Command an error was raised for
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Operation {
    /// SELECT by file identifier
    #[display("select")]
    SelectFile,
    /// READ BINARY
    #[display("read")]
    ReadBinary,
    /// SELECT by application identifier
    #[display("select application")]
    SelectApplication,
}

/// The elementary files holding identity data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ElementaryFile {
    /// Document number, dates and issuing authority
    #[display("DOCUMENT")]
    Document,
    /// Names, personal number, sex and birth data
    #[display("PERSONAL")]
    Personal,
    /// Residence address
    #[display("RESIDENCE")]
    Residence,
    /// Holder's photograph
    #[display("PHOTO")]
    Photo,
}

impl ElementaryFile {
    /// Two-byte file identifier
    pub const fn id(self) -> [u8; 2] {
        match self {
            Self::Document => [0x0F, 0x02],
            Self::Personal => [0x0F, 0x03],
            Self::Residence => [0x0F, 0x04],
            Self::Photo => [0x0F, 0x06],
        }
    }
}

fn exchange<T: CardTransport + ?Sized>(
    transport: &mut T,
    command: &Command,
    operation: Operation,
) -> Result<Bytes> {
    let response = transport.transmit(command)?;
    let status = response.status();
    if !status.is_success() {
        // absent files are routine on cards issued without a residence record
        if status.is_file_not_found() {
            debug!(%operation, "File not found");
        } else {
            warn!(%operation, %status, reason = status.description(), "Card rejected command");
        }
        return Err(Error::Protocol { operation, status });
    }
    Ok(response.into_payload())
}

/// Select an elementary file, optionally asking for `le` bytes of file info
pub fn select_file<T: CardTransport + ?Sized>(
    transport: &mut T,
    file: ElementaryFile,
    le: Option<u8>,
) -> Result<Bytes> {
    trace!(%file, "Selecting file");
    let command = Command::new_with_data(0x00, 0xA4, 0x08, 0x00, file.id().to_vec());
    let command = match le {
        Some(le) => command.with_le(le),
        None => command,
    };
    exchange(transport, &command, Operation::SelectFile)
}

/// Read at most `length` bytes of the selected file starting at `offset`
pub fn read_binary<T: CardTransport + ?Sized>(
    transport: &mut T,
    offset: u16,
    length: u8,
) -> Result<Bytes> {
    let [hi, lo] = offset.to_be_bytes();
    let command = Command::new_with_le(0x00, 0xB0, hi, lo, length);
    exchange(transport, &command, Operation::ReadBinary)
}

/// Select an application by its identifier
pub fn select_application<T: CardTransport + ?Sized>(transport: &mut T, aid: &[u8]) -> Result<()> {
    debug!(aid = %hex::encode_upper(aid), "Selecting application");
    let command = Command::new_with_data(0x00, 0xA4, 0x04, 0x00, aid.to_vec());
    exchange(transport, &command, Operation::SelectApplication).map(|_| ())
}
