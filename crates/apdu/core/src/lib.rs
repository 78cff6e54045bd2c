//! Core traits and types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types and traits for talking to a smart
//! card with ISO/IEC 7816-4 command/response pairs.
//!
//! ## Overview
//!
//! - [`Command`] builds the raw bytes of a short APDU (CLA, INS, P1, P2, Lc/data, Le)
//! - [`Response`] splits a raw response into payload and [`StatusWord`]
//! - [`CardTransport`] is the card channel: it sends raw APDUs to one connected card
//!   and brackets multi-command operations with exclusive access
//! - [`CardTerminal`] is the slot a card is inserted into: presence checks,
//!   blocking presence waits and connecting
//!
//! Transports know nothing about the card's applications or file layout; that lives
//! in the crates built on top of this one.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::{Command, ExpectedLength};
pub use response::Response;
pub use response::error::ResponseError;
pub use response::status::StatusWord;
pub use transport::terminal::CardTerminal;
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, Command, Error, Response, Result, StatusWord,
        transport::terminal::CardTerminal,
        transport::{CardTransport, TransportError},
    };
}
