//! Shared handle to the connected card

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::atr::CardGeneration;
use crate::card::CardSession;
use crate::error::{Error, Result};
use crate::info::IdentityRecord;
use crate::photo::Photo;
use crate::tlv::UnknownTags;

struct Shared {
    session: Mutex<Option<Box<dyn CardSession>>>,
    faulted: AtomicBool,
}

/// Handle to the card the presence monitor connected
///
/// Clones refer to the same session. Reads are serialized through the handle. Once
/// the card is removed, or the monitor drops the session after a fault, every
/// operation fails with [`Error::NotConnected`].
#[derive(Clone)]
pub struct CardHandle {
    shared: Arc<Shared>,
    generation: CardGeneration,
    atr: Bytes,
}

impl fmt::Debug for CardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardHandle")
            .field("generation", &self.generation)
            .field("atr", &hex::encode_upper(&self.atr))
            .finish_non_exhaustive()
    }
}

impl CardHandle {
    pub(crate) fn new(session: Box<dyn CardSession>) -> Self {
        let generation = session.generation();
        let atr = Bytes::copy_from_slice(session.atr());
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Some(session)),
                faulted: AtomicBool::new(false),
            }),
            generation,
            atr,
        }
    }

    /// Generation of the card
    pub const fn generation(&self) -> CardGeneration {
        self.generation
    }

    /// Answer-to-reset of the card
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// Whether the session is still open
    pub fn is_connected(&self) -> bool {
        self.shared
            .session
            .lock()
            .as_ref()
            .is_some_and(|session| session.is_connected())
    }

    /// Whether both handles refer to the same connection
    pub fn same_card(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Read the identity files
    pub fn read_identity(&self) -> Result<IdentityRecord> {
        self.with_session(|session| session.read_identity())
    }

    /// Read the identity files and return every unmapped tag alongside the record
    pub fn read_identity_with_diagnostics(&self) -> Result<(IdentityRecord, UnknownTags)> {
        self.with_session(|session| session.read_identity_with_diagnostics())
    }

    /// Read the holder's photograph
    pub fn read_photo(&self) -> Result<Photo> {
        self.with_session(|session| session.read_photo())
    }

    /// Disconnect the card, leaving it powered
    ///
    /// The monitor keeps reporting presence; the card is connected again only after
    /// it is removed and reinserted.
    pub fn disconnect(&self) -> Result<()> {
        let session = self.shared.session.lock().take();
        session.ok_or(Error::NotConnected)?.disconnect()
    }

    fn with_session<R>(&self, read: impl FnOnce(&mut dyn CardSession) -> Result<R>) -> Result<R> {
        let mut session = self.shared.session.lock();
        let session = session.as_deref_mut().ok_or(Error::NotConnected)?;
        let result = read(session);
        if let Err(e) = &result
            && e.is_transport_fault()
        {
            debug!(error = %e, "Card read faulted, flagging session");
            self.shared.faulted.store(true, Ordering::Release);
        }
        result
    }

    /// Clear and return the fault flag set by a failed read
    pub(crate) fn take_fault(&self) -> bool {
        self.shared.faulted.swap(false, Ordering::AcqRel)
    }

    /// Drop the session without talking to the card
    pub(crate) fn release(&self) {
        drop(self.shared.session.lock().take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::EidCard;
    use crate::commands::ElementaryFile;
    use crate::testing::{MockTransport, SimulatedCard, tlv};

    fn handle(card: SimulatedCard) -> (CardHandle, MockTransport) {
        let transport = MockTransport::simulated(card);
        let card = EidCard::open(transport.clone()).unwrap();
        (CardHandle::new(Box::new(card)), transport)
    }

    #[test]
    fn test_read_and_disconnect() {
        let (handle, transport) = handle(
            SimulatedCard::new(CardGeneration::SmartCafe)
                .with_file(ElementaryFile::Document, tlv(1546, b"009876543"))
                .with_file(ElementaryFile::Personal, tlv(1559, b"Jovanovi\xC4\x87"))
                .with_file(ElementaryFile::Residence, tlv(1568, b"SRB")),
        );
        assert_eq!(handle.generation(), CardGeneration::SmartCafe);
        assert!(handle.is_connected());
        assert!(handle.same_card(&handle.clone()));

        let record = handle.read_identity().unwrap();
        assert_eq!(record.surname(), Some("Jovanović"));
        assert!(!handle.take_fault());

        handle.disconnect().unwrap();
        assert!(!handle.is_connected());
        assert_eq!(transport.disconnects(), 1);
        assert!(matches!(handle.disconnect(), Err(Error::NotConnected)));
        assert!(matches!(handle.read_photo(), Err(Error::NotConnected)));
    }

    #[test]
    fn test_fault_flag() {
        let (handle, _transport) = handle(
            SimulatedCard::new(CardGeneration::Apollo).with_faulty_file(ElementaryFile::Document),
        );
        assert!(handle.read_identity().is_err());
        assert!(handle.take_fault());
        assert!(!handle.take_fault());

        handle.release();
        assert!(!handle.is_connected());
        assert!(matches!(handle.read_identity(), Err(Error::NotConnected)));
        assert!(!handle.take_fault());
    }

    #[test]
    fn test_missing_file_is_not_a_fault() {
        let (handle, _transport) = handle(SimulatedCard::new(CardGeneration::Apollo));
        assert!(matches!(
            handle.read_identity(),
            Err(Error::MissingFile {
                file: ElementaryFile::Document
            })
        ));
        assert!(!handle.take_fault());
    }
}
