//! Card presence monitoring
//!
//! A [`PresenceMonitor`] owns one terminal and drives it from a dedicated thread. It
//! connects recognized cards when they are inserted, disconnects them when they are
//! removed and tells registered [`ReaderListener`]s about both.
//!
//! ```text
//!              present, recognized                 absent
//!   NoCard ─────────────────────────▶ Connected ─────────────▶ NoCard
//!     │  present, unrecognized                    (emits removed)
//!     ▼          (emits inserted)
//!   WrongCardPresent ───── absent ───▶ NoCard
//! ```
//!
//! Transport faults force the state back to `NoCard` and, if the card is still
//! there, reconnect once.

mod config;
mod handle;
mod listener;

pub use config::{ACTIVE_PROBE_ENV, MonitorConfig, PollingStrategy};
pub use handle::CardHandle;
pub use listener::{CardEvent, FnListener, ReaderListener, card_event_channel};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use eid_apdu_core::{CardTerminal, CardTransport};
use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::card::EidCard;
use crate::error::{Error, Result};

/// What the monitor believes is in the reader
#[derive(Debug, Clone, Default)]
pub enum PresenceState {
    /// The reader is empty
    #[default]
    NoCard,
    /// A card is present but its ATR was not recognized
    WrongCardPresent,
    /// A recognized card is connected
    Connected(CardHandle),
}

impl PresenceState {
    /// Whether a recognized card is connected
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

type Listeners = Arc<Vec<Arc<dyn ReaderListener>>>;

#[derive(Default)]
struct Inner {
    listeners: Listeners,
    current: Option<CardHandle>,
}

/// Listener registry shared by the monitor thread and its owner
///
/// The listener list is copy-on-write so a broadcast iterates a snapshot. The
/// reentrant lock orders broadcasts against registration replays, and lets a
/// listener register another one from inside its callback.
#[derive(Default)]
struct Registry {
    broadcast: ReentrantMutex<()>,
    inner: Mutex<Inner>,
}

impl Registry {
    fn add(&self, listener: Arc<dyn ReaderListener>) {
        let _broadcast = self.broadcast.lock();
        let current = {
            let mut inner = self.inner.lock();
            let mut listeners = Vec::clone(&inner.listeners);
            listeners.push(Arc::clone(&listener));
            inner.listeners = Arc::new(listeners);
            inner.current.clone()
        };
        if let Some(card) = current {
            debug!("Replaying insertion to new listener");
            listener.inserted(card);
        }
    }

    fn remove(&self, listener: &Arc<dyn ReaderListener>) -> bool {
        let mut inner = self.inner.lock();
        let target = Arc::as_ptr(listener).cast::<()>();
        let Some(index) = inner
            .listeners
            .iter()
            .position(|l| Arc::as_ptr(l).cast::<()>() == target)
        else {
            return false;
        };
        let mut listeners = Vec::clone(&inner.listeners);
        listeners.remove(index);
        inner.listeners = Arc::new(listeners);
        true
    }

    fn current(&self) -> Option<CardHandle> {
        self.inner.lock().current.clone()
    }

    fn inserted(&self, card: &CardHandle) {
        let _broadcast = self.broadcast.lock();
        let listeners = {
            let mut inner = self.inner.lock();
            inner.current = Some(card.clone());
            Arc::clone(&inner.listeners)
        };
        for listener in listeners.iter() {
            listener.inserted(card.clone());
        }
    }

    fn removed(&self) {
        let _broadcast = self.broadcast.lock();
        let listeners = {
            let mut inner = self.inner.lock();
            inner.current = None;
            Arc::clone(&inner.listeners)
        };
        for listener in listeners.iter() {
            listener.removed();
        }
    }

    fn clear(&self) {
        let _broadcast = self.broadcast.lock();
        self.inner.lock().current = None;
    }
}

/// Watches one reader and reports card insertion and removal
///
/// Dropping the monitor stops its thread and disconnects the current card without
/// notifying listeners.
pub struct PresenceMonitor {
    registry: Arc<Registry>,
    reader: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PresenceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceMonitor")
            .field("reader", &self.reader)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl PresenceMonitor {
    /// Start monitoring `terminal` on a new thread
    pub fn spawn<M>(terminal: M, config: MonitorConfig) -> std::io::Result<Self>
    where
        M: CardTerminal + 'static,
    {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        let registry = Arc::new(Registry::default());
        let reader = terminal.name().to_owned();

        let presence = PresenceLoop {
            terminal,
            config,
            state: PresenceState::NoCard,
            registry: Arc::clone(&registry),
            stop: stop_rx,
        };
        let thread = thread::Builder::new()
            .name("eid-presence".into())
            .spawn(move || presence.run())?;
        info!(reader = %reader, strategy = ?config.strategy, "Presence monitor started");

        Ok(Self {
            registry,
            reader,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Register a listener
    ///
    /// If a card is connected the listener immediately gets `inserted` for it.
    pub fn add_listener(&self, listener: Arc<dyn ReaderListener>) {
        self.registry.add(listener);
    }

    /// Unregister a listener, returning whether it was registered
    pub fn remove_listener(&self, listener: &Arc<dyn ReaderListener>) -> bool {
        self.registry.remove(listener)
    }

    /// The connected card, if any
    pub fn current_card(&self) -> Option<CardHandle> {
        self.registry.current()
    }

    /// Name of the monitored reader
    pub fn reader(&self) -> &str {
        &self.reader
    }

    /// Whether the monitor thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the monitor thread and wait for it to exit
    ///
    /// Called from a listener callback the thread is only signalled, not joined.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!(reader = %self.reader, "Presence monitor thread panicked");
        }
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PresenceLoop<M> {
    terminal: M,
    config: MonitorConfig,
    state: PresenceState,
    registry: Arc<Registry>,
    stop: Receiver<()>,
}

impl<M> PresenceLoop<M>
where
    M: CardTerminal + 'static,
{
    fn run(mut self) {
        while !self.stop_requested() {
            if let Err(e) = self.cycle() {
                warn!(error = %e, "Transport fault while polling reader");
                self.recover();
            }
            if let PollingStrategy::ActiveProbe { interval } = self.config.strategy {
                self.pause(interval);
            }
        }
        self.shutdown();
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep unless stop is requested first
    fn pause(&self, duration: Duration) {
        match self.stop.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => debug!("Pause interrupted by stop request"),
        }
    }

    fn cycle(&mut self) -> Result<()> {
        if let PresenceState::Connected(card) = &self.state
            && card.take_fault()
        {
            warn!("Card session reported a transport fault");
            self.recover();
            // a channel that faults again on every read must not spin
            if matches!(self.state, PresenceState::Connected(_)) {
                self.pause(self.config.fault_backoff);
            }
            return Ok(());
        }

        let present = self.card_present()?;
        match (&self.state, present) {
            (PresenceState::NoCard, true) => self.connect()?,
            (PresenceState::Connected(_), false) => self.card_removed(),
            (PresenceState::WrongCardPresent, false) => {
                debug!("Unrecognized card removed");
                self.state = PresenceState::NoCard;
            }
            _ => {}
        }
        Ok(())
    }

    fn card_present(&self) -> Result<bool> {
        match self.config.strategy {
            PollingStrategy::Blocking { timeout } => {
                let changed = match self.state {
                    PresenceState::NoCard => self.terminal.wait_for_card_present(timeout),
                    _ => self.terminal.wait_for_card_absent(timeout),
                };
                changed.map_err(Error::transport)?;
                self.terminal.is_card_present().map_err(Error::transport)
            }
            PollingStrategy::ActiveProbe { .. } => self.probe(),
        }
    }

    /// Presence by opening and closing a throwaway connection
    fn probe(&self) -> Result<bool> {
        match self.terminal.connect() {
            Ok(mut transport) => {
                if let Err(e) = transport.disconnect() {
                    debug!(error = ?e, "Failed to close probe connection");
                }
                Ok(true)
            }
            Err(e) => {
                let e: eid_apdu_core::Error = e.into();
                if e.is_card_gone() {
                    return Ok(false);
                }
                debug!(error = %e, "Probe connect failed, asking reader status");
                self.terminal.is_card_present().map_err(Error::transport)
            }
        }
    }

    fn connect(&mut self) -> Result<()> {
        let transport = self.terminal.connect().map_err(Error::transport)?;
        match EidCard::open(transport) {
            Ok(card) => {
                let handle = CardHandle::new(Box::new(card));
                info!(
                    reader = self.terminal.name(),
                    generation = %handle.generation(),
                    "Card inserted"
                );
                self.state = PresenceState::Connected(handle.clone());
                self.registry.inserted(&handle);
                Ok(())
            }
            Err(Error::UnrecognizedCard { atr }) => {
                info!(
                    reader = self.terminal.name(),
                    atr = %hex::encode_upper(&atr),
                    "Unrecognized card present"
                );
                self.state = PresenceState::WrongCardPresent;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn card_removed(&mut self) {
        if let PresenceState::Connected(card) = std::mem::take(&mut self.state) {
            if let Err(e) = card.disconnect() {
                debug!(error = %e, "Disconnect of removed card failed");
            }
            info!(reader = self.terminal.name(), "Card removed");
            self.registry.removed();
        }
    }

    /// Drop whatever session is held and reconnect once if the card is still there
    fn recover(&mut self) {
        if let PresenceState::Connected(card) = std::mem::take(&mut self.state) {
            card.release();
            self.registry.removed();
        }

        match self.terminal.is_card_present() {
            Ok(true) => {
                info!(reader = self.terminal.name(), "Reconnecting after fault");
                if let Err(e) = self.connect() {
                    warn!(error = %e, "Reconnect failed");
                    self.state = PresenceState::NoCard;
                    self.pause(self.config.fault_backoff);
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = ?e, "Reader presence check failed");
                self.pause(self.config.fault_backoff);
            }
        }
    }

    fn shutdown(&mut self) {
        if let PresenceState::Connected(card) = std::mem::take(&mut self.state)
            && let Err(e) = card.disconnect()
        {
            debug!(error = %e, "Disconnect on shutdown failed");
        }
        self.registry.clear();
        info!(reader = self.terminal.name(), "Presence monitor stopped");
    }
}
