//! APDU command definitions
//!
//! Short APDUs only (ISO/IEC 7816-4 cases 1 to 4): the identity cards this crate
//! talks to never exchange more than 255 bytes in one command or response.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// Generic APDU command structure
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Some(data.into()),
            le: None,
        }
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        // CLA, INS, P1, P2
        let mut length = 4;
        if let Some(data) = self.data.as_deref() {
            length += 1 + data.len();
        }
        if self.le.is_some() {
            length += 1;
        }
        length
    }

    /// Convert to raw APDU bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(data) = self.data.as_deref() {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("cla", &format_args!("{:#04x}", self.cla))
            .field("ins", &format_args!("{:#04x}", self.ins))
            .field("p1", &format_args!("{:#04x}", self.p1))
            .field("p2", &format_args!("{:#04x}", self.p2))
            .field("data", &self.data.as_ref().map(hex::encode_upper))
            .field("le", &self.le)
            .finish()
    }
}
