//! Transport traits for APDU communication with cards
//!
//! [`CardTransport`] is the channel to one connected card. [`terminal::CardTerminal`]
//! is the slot the card sits in and hands out transports.

pub mod error;
pub mod terminal;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

use crate::{Command, Response};

/// Trait for basic card transports
///
/// A transport sends and receives raw APDU bytes. It knows nothing about the
/// applications or files on the card.
pub trait CardTransport: Send + fmt::Debug {
    /// Error type returned by the transport
    type Error: Into<crate::Error> + fmt::Debug;

    /// Send raw APDU bytes to card and return response bytes
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        trace!(command = %hex::encode_upper(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error>;

    /// Send a command and split the answer into payload and status word
    ///
    /// The status word is not checked here.
    fn transmit(&mut self, command: &Command) -> crate::Result<Response> {
        let raw = self
            .transmit_raw(&command.to_bytes())
            .map_err(Into::into)?;
        Ok(Response::from_bytes(&raw)?)
    }

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Answer-to-reset of the connected card
    fn atr(&self) -> Result<Bytes, Self::Error>;

    /// Reserve the card for this connection until [`end_exclusive`](Self::end_exclusive)
    fn begin_exclusive(&mut self) -> Result<(), Self::Error>;

    /// Release a reservation taken by [`begin_exclusive`](Self::begin_exclusive)
    fn end_exclusive(&mut self) -> Result<(), Self::Error>;

    /// Close the connection, leaving the card powered
    fn disconnect(&mut self) -> Result<(), Self::Error>;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    type Error = T::Error;

    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        (**self).transmit_raw(command)
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn atr(&self) -> Result<Bytes, Self::Error> {
        (**self).atr()
    }

    fn begin_exclusive(&mut self) -> Result<(), Self::Error> {
        (**self).begin_exclusive()
    }

    fn end_exclusive(&mut self) -> Result<(), Self::Error> {
        (**self).end_exclusive()
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        (**self).disconnect()
    }
}

#[cfg(test)]
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub(crate) struct MockTransport {
    pub responses: Vec<Bytes>,
    pub commands: Vec<Bytes>,
    pub connected: bool,
}

#[cfg(test)]
impl MockTransport {
    pub(crate) fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
            connected: true,
        }
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, Self::Error> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.commands.push(Bytes::copy_from_slice(command));
        if self.responses.is_empty() {
            return Err(TransportError::Transmission);
        }
        Ok(self.responses.remove(0))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn atr(&self) -> Result<Bytes, Self::Error> {
        Ok(Bytes::new())
    }

    fn begin_exclusive(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.connected = false;
        Ok(())
    }
}
