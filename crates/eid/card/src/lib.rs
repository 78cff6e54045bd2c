//! Serbian eID smart card protocol
//!
//! Recognizes the card generation from its answer-to-reset, reads the document,
//! personal, residence and photo files the way that generation lays them out, and
//! decodes the records into an [`IdentityRecord`].
//!
//! The crate speaks to cards only through the [`CardTransport`] and
//! [`CardTerminal`] traits of `eid-apdu-core`, so any reader backend works.
//!
//! ## Reading a card once
//!
//! ```no_run
//! # fn read<T: eid_apdu_core::CardTransport>(transport: T) -> eid_card::Result<()> {
//! use eid_card::{CardSession, EidCard};
//!
//! let mut card = EidCard::open(transport)?;
//! let record = card.read_identity()?;
//! println!("{}", record.full_name());
//! card.disconnect()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Watching a reader
//!
//! [`PresenceMonitor`] polls a terminal on its own thread and reports insertions and
//! removals to [`ReaderListener`]s, or into a channel from [`card_event_channel`].
//!
//! [`CardTransport`]: eid_apdu_core::CardTransport
//! [`CardTerminal`]: eid_apdu_core::CardTerminal
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod atr;
pub mod card;
pub mod commands;
pub mod info;
pub mod monitor;
pub mod photo;
pub mod tags;
pub mod tlv;

mod error;
pub use error::{Error, Result};

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use atr::{CardGeneration, classify};
pub use card::{CardSession, EidCard};
pub use commands::{ElementaryFile, Operation};
pub use info::{IdentityRecord, IdentityRecordBuilder, format_date};
pub use monitor::{
    CardEvent, CardHandle, FnListener, MonitorConfig, PollingStrategy, PresenceMonitor,
    PresenceState, ReaderListener, card_event_channel,
};
pub use photo::Photo;
pub use tags::FieldTag;
pub use tlv::{UnknownTag, UnknownTags};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        CardEvent, CardGeneration, CardHandle, CardSession, EidCard, Error, FieldTag,
        IdentityRecord, MonitorConfig, Photo, PollingStrategy, PresenceMonitor, ReaderListener,
        Result,
    };
}
