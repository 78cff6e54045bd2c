//! Card generation detection from the answer-to-reset

use tracing::debug;

use crate::error::{Error, Result};

/// Card hardware and OS generations issued so far
///
/// The generation decides how elementary files are framed and whether the identity
/// application must be selected before files can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CardGeneration {
    /// Apollo cards, issued from 2008. Files are selected directly.
    #[display("Apollo")]
    Apollo,
    /// Gemalto cards, issued from 2014
    #[display("Gemalto")]
    Gemalto,
    /// SmartCafe Expert cards, the current generation
    #[display("SmartCafe")]
    SmartCafe,
}

impl CardGeneration {
    /// Identity application to select after connecting, if any
    pub const fn application_id(self) -> Option<&'static [u8]> {
        match self {
            Self::Apollo => None,
            Self::Gemalto | Self::SmartCafe => Some(&crate::commands::IDENTITY_AID),
        }
    }
}

const APOLLO_ATR: &[u8] = &[
    0x3B, 0xB9, 0x18, 0x00, 0x81, 0x31, 0xFE, 0x9E, 0x80, 0x73, 0xFF, 0x61, 0x40, 0x83, 0x00,
    0x00, 0x00, 0xDF,
];

const GEMALTO_ATR: &[u8] = &[
    0x3B, 0xFF, 0x94, 0x00, 0x00, 0x81, 0x31, 0x80, 0x43, 0x80, 0x31, 0x80, 0x65, 0xB0, 0x85,
    0x02, 0x01, 0xF3, 0x12, 0x0F, 0xFF, 0x82, 0x90, 0x00, 0x79,
];

const SMARTCAFE_ATR: &[u8] = &[
    0x3B, 0xF9, 0x96, 0x00, 0x00, 0x80, 0x31, 0xFE, 0x45, 0x53, 0x43, 0x45, 0x37, 0x20, 0x47,
    0x43, 0x4E, 0x33, 0x5E,
];

const SMARTCAFE_8_ATR: &[u8] = &[
    0x3B, 0x9E, 0x96, 0x80, 0x31, 0xFE, 0x45, 0x53, 0x43, 0x45, 0x20, 0x38, 0x2E, 0x30, 0x2D,
    0x43, 0x31, 0x56, 0x30, 0x0D, 0x0A, 0x6F,
];

/// Known ATRs, matched in order
pub const KNOWN_ATRS: &[(&[u8], CardGeneration)] = &[
    (APOLLO_ATR, CardGeneration::Apollo),
    (GEMALTO_ATR, CardGeneration::Gemalto),
    (SMARTCAFE_ATR, CardGeneration::SmartCafe),
    (SMARTCAFE_8_ATR, CardGeneration::SmartCafe),
];

/// Find the generation of a card from its ATR
///
/// Only exact matches count. Anything else is [`Error::UnrecognizedCard`].
pub fn classify(atr: &[u8]) -> Result<CardGeneration> {
    let generation = KNOWN_ATRS
        .iter()
        .find(|(known, _)| *known == atr)
        .map(|(_, generation)| *generation);

    match generation {
        Some(generation) => {
            debug!(%generation, "Recognized card");
            Ok(generation)
        }
        None => Err(Error::UnrecognizedCard {
            atr: bytes::Bytes::copy_from_slice(atr),
        }),
    }
}
