//! Card terminal abstraction
//!
//! A terminal is one reader slot. It reports whether a card is inserted, blocks
//! until that changes and opens a [`CardTransport`] to the inserted card.

use std::fmt;
use std::time::Duration;

use super::CardTransport;

/// One card reader slot
pub trait CardTerminal: Send + Sync + fmt::Debug {
    /// Transport opened by [`connect`](Self::connect)
    type Transport: CardTransport + 'static;
    /// Error type returned by the terminal
    type Error: Into<crate::Error> + fmt::Debug;

    /// Reader name as reported by the driver
    fn name(&self) -> &str;

    /// Check if a card is inserted right now
    fn is_card_present(&self) -> Result<bool, Self::Error>;

    /// Block until a card is inserted or `timeout` elapses
    ///
    /// Returns whether a card is present on return. Some drivers return
    /// immediately, so callers must not rely on the call having blocked.
    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool, Self::Error>;

    /// Block until the card is removed or `timeout` elapses
    ///
    /// Returns whether the slot is empty on return.
    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool, Self::Error>;

    /// Connect to the inserted card
    fn connect(&self) -> Result<Self::Transport, Self::Error>;
}
