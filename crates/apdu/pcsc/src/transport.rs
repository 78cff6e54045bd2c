//! PC/SC transport implementation

use std::fmt;
use std::result::Result;

use eid_apdu_core::prelude::*;
use pcsc::{Attribute, Card, Disposition};
use tracing::{debug, warn};

use crate::config::{PcscConfig, ShareMode};
use crate::error::PcscError;

/// Transport implementation using PC/SC
pub struct PcscTransport {
    /// Card connection, `None` once disconnected
    card: Option<Card>,
    /// Reader name
    reader_name: String,
    /// Configuration
    config: PcscConfig,
    /// Whether the card is currently held exclusively
    exclusive: bool,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

impl PcscTransport {
    pub(crate) const fn new(card: Card, reader_name: String, config: PcscConfig) -> Self {
        Self {
            card: Some(card),
            reader_name,
            config,
            exclusive: false,
        }
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    fn card(&self) -> Result<&Card, PcscError> {
        self.card
            .as_ref()
            .ok_or_else(|| PcscError::NotConnected(self.reader_name.clone()))
    }

    fn card_mut(&mut self) -> Result<&mut Card, PcscError> {
        match self.card.as_mut() {
            Some(card) => Ok(card),
            None => Err(PcscError::NotConnected(self.reader_name.clone())),
        }
    }

    /// Re-open the connection with another share mode, keeping the card powered
    fn reconnect_as(&mut self, mode: ShareMode) -> Result<(), PcscError> {
        let protocols = self.config.protocols;
        let card = self.card_mut()?;
        card.reconnect(mode.into(), protocols, Disposition::LeaveCard)?;
        Ok(())
    }

    /// Forget the connection after the card went away underneath it
    fn drop_on_card_loss(&mut self, error: pcsc::Error) {
        if matches!(error, pcsc::Error::RemovedCard | pcsc::Error::NoSmartcard) {
            debug!(reader = %self.reader_name, "Card gone, dropping connection");
            self.card = None;
            self.exclusive = false;
        }
    }
}

impl CardTransport for PcscTransport {
    type Error = PcscError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        let mut response_buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        let result = self
            .card_mut()?
            .transmit(command, &mut response_buffer)
            .map(Bytes::copy_from_slice);

        result.map_err(|e| {
            self.drop_on_card_loss(e);
            e.into()
        })
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn atr(&self) -> Result<Bytes, Self::Error> {
        let atr = self.card()?.get_attribute_owned(Attribute::AtrString)?;
        Ok(Bytes::from(atr))
    }

    fn begin_exclusive(&mut self) -> Result<(), Self::Error> {
        if self.exclusive || self.config.share_mode == ShareMode::Exclusive {
            self.exclusive = true;
            return Ok(());
        }
        self.reconnect_as(ShareMode::Exclusive).inspect_err(|e| {
            if let PcscError::Pcsc(e) = e {
                self.drop_on_card_loss(*e);
            }
        })?;
        self.exclusive = true;
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), Self::Error> {
        if !self.exclusive {
            return Ok(());
        }
        self.exclusive = false;
        if self.config.share_mode == ShareMode::Exclusive {
            return Ok(());
        }
        self.reconnect_as(self.config.share_mode)
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.exclusive = false;
        let card = self
            .card
            .take()
            .ok_or_else(|| PcscError::NotConnected(self.reader_name.clone()))?;
        card.disconnect(Disposition::LeaveCard)
            .map_err(|(_, e)| PcscError::from(e))
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Some(card) = self.card.take()
            && let Err((_, e)) = card.disconnect(Disposition::LeaveCard)
        {
            warn!(reader = %self.reader_name, error = %e, "Failed to disconnect card");
        }
    }
}
