//! Listener callbacks for card insertion and removal

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use tracing::trace;

use super::handle::CardHandle;

/// Receives card insertion and removal events
///
/// Callbacks run on the monitor thread. Reading the card from `inserted` is fine;
/// blocking for long delays presence detection.
pub trait ReaderListener: Send + Sync {
    /// A recognized card was connected
    fn inserted(&self, card: CardHandle);

    /// The previously inserted card is gone
    fn removed(&self);
}

/// Event form of the listener callbacks
#[derive(Debug, Clone)]
pub enum CardEvent {
    /// A recognized card was connected
    Inserted(CardHandle),
    /// The previously inserted card is gone
    Removed,
}

impl CardEvent {
    /// Whether this is an insertion
    pub const fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Forwards events into a channel; a closed channel drops them
impl ReaderListener for Sender<CardEvent> {
    fn inserted(&self, card: CardHandle) {
        if self.send(CardEvent::Inserted(card)).is_err() {
            trace!("Event receiver gone, dropping insertion");
        }
    }

    fn removed(&self) {
        if self.send(CardEvent::Removed).is_err() {
            trace!("Event receiver gone, dropping removal");
        }
    }
}

/// Unbounded channel to register as a listener
pub fn card_event_channel() -> (Sender<CardEvent>, Receiver<CardEvent>) {
    crossbeam_channel::unbounded()
}

/// Listener built from two closures
pub struct FnListener<I, R> {
    on_inserted: I,
    on_removed: R,
}

impl<I, R> fmt::Debug for FnListener<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").finish_non_exhaustive()
    }
}

impl<I, R> FnListener<I, R>
where
    I: Fn(CardHandle) + Send + Sync,
    R: Fn() + Send + Sync,
{
    /// Create a listener calling `on_inserted` and `on_removed`
    pub const fn new(on_inserted: I, on_removed: R) -> Self {
        Self {
            on_inserted,
            on_removed,
        }
    }
}

impl<I, R> ReaderListener for FnListener<I, R>
where
    I: Fn(CardHandle) + Send + Sync,
    R: Fn() + Send + Sync,
{
    fn inserted(&self, card: CardHandle) {
        (self.on_inserted)(card);
    }

    fn removed(&self) {
        (self.on_removed)();
    }
}
