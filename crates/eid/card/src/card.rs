//! Card sessions
//!
//! An [`EidCard`] owns the connection to one recognized card. Each read takes the
//! card exclusively for its duration and releases it on every exit path.

use std::fmt;

use bytes::{Bytes, BytesMut};
use eid_apdu_core::CardTransport;
use tracing::{debug, info, instrument, trace, warn};

use crate::atr::{self, CardGeneration};
use crate::commands::{ElementaryFile, MAX_READ_LENGTH, read_binary, select_application, select_file};
use crate::error::{Error, Result};
use crate::info::IdentityRecord;
use crate::photo::Photo;
use crate::tags::{DOCUMENT_TAGS, PERSONAL_TAGS, RESIDENCE_TAGS};
use crate::tlv::{UnknownTags, map_tags, parse_tlv};

/// Operations every card generation supports
pub trait CardSession: Send + fmt::Debug {
    /// Generation the card was recognized as
    fn generation(&self) -> CardGeneration;

    /// Answer-to-reset the card was recognized by
    fn atr(&self) -> &[u8];

    /// Whether the session still holds its connection
    fn is_connected(&self) -> bool;

    /// Read the identity files and return the record with every unmapped tag
    fn read_identity_with_diagnostics(&mut self) -> Result<(IdentityRecord, UnknownTags)>;

    /// Read the identity files
    ///
    /// Unmapped tags are logged and otherwise dropped.
    fn read_identity(&mut self) -> Result<IdentityRecord> {
        self.read_identity_with_diagnostics().map(|(record, _)| record)
    }

    /// Read the holder's photograph
    fn read_photo(&mut self) -> Result<Photo>;

    /// Release the connection, leaving the card powered
    ///
    /// Fails with [`Error::NotConnected`] when called a second time.
    fn disconnect(&mut self) -> Result<()>;
}

/// Session with one recognized identity card
pub struct EidCard<T: CardTransport> {
    transport: Option<T>,
    generation: CardGeneration,
    atr: Bytes,
}

impl<T: CardTransport> fmt::Debug for EidCard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EidCard")
            .field("generation", &self.generation)
            .field("atr", &hex::encode_upper(&self.atr))
            .field("transport", &self.transport)
            .finish()
    }
}

impl<T: CardTransport> EidCard<T> {
    /// Recognize the connected card and open a session with it
    ///
    /// An unrecognized card is disconnected before [`Error::UnrecognizedCard`] is
    /// returned.
    pub fn open(mut transport: T) -> Result<Self> {
        let atr = transport.atr().map_err(Error::transport)?;
        match atr::classify(&atr) {
            Ok(generation) => Self::with_generation(transport, generation, atr),
            Err(e) => {
                if let Err(err) = transport.disconnect() {
                    debug!(error = ?err, "Failed to disconnect unrecognized card");
                }
                Err(e)
            }
        }
    }

    /// Open a session with a card whose generation is already known
    ///
    /// Selects the identity application on generations that need it.
    pub fn with_generation(mut transport: T, generation: CardGeneration, atr: Bytes) -> Result<Self> {
        if let Some(aid) = generation.application_id() {
            select_application(&mut transport, aid)?;
        }
        info!(%generation, atr = %hex::encode_upper(&atr), "Opened identity card session");

        Ok(Self {
            transport: Some(transport),
            generation,
            atr,
        })
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(Error::NotConnected)
    }

    /// Read one elementary file under an exclusive session
    ///
    /// With `strip_inner_framing` the file's inner record header is dropped too,
    /// which is how the photo is stored.
    pub fn read_elementary_file(
        &mut self,
        file: ElementaryFile,
        strip_inner_framing: bool,
    ) -> Result<Bytes> {
        let generation = self.generation;
        let mut session = ExclusiveSession::begin(self.transport()?)?;
        read_elementary_file(session.transport(), generation, file, strip_inner_framing)
    }
}

impl<T: CardTransport> CardSession for EidCard<T> {
    fn generation(&self) -> CardGeneration {
        self.generation
    }

    fn atr(&self) -> &[u8] {
        &self.atr
    }

    fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    #[instrument(skip(self), fields(generation = %self.generation))]
    fn read_identity_with_diagnostics(&mut self) -> Result<(IdentityRecord, UnknownTags)> {
        let generation = self.generation;
        let files = {
            let mut session = ExclusiveSession::begin(self.transport()?)?;
            let mut read = |file| read_elementary_file(session.transport(), generation, file, false);
            [
                (read(ElementaryFile::Document)?, &DOCUMENT_TAGS),
                (read(ElementaryFile::Personal)?, &PERSONAL_TAGS),
                (read(ElementaryFile::Residence)?, &RESIDENCE_TAGS),
            ]
        };

        let mut builder = IdentityRecord::builder();
        let mut unknown = UnknownTags::new();
        for (data, table) in files {
            let record = parse_tlv(&data)?;
            unknown.extend(map_tags(&record, table, &mut builder));
        }
        let record = builder.build();

        for tag in &unknown {
            warn!(
                file = %tag.file,
                tag = tag.tag,
                text = %tag.text(),
                value = %hex::encode_upper(&tag.value),
                "Unknown tag on card, please report it"
            );
        }
        if record.personal_number().is_some() && !record.personal_number_is_well_formed() {
            warn!("Personal number is not 13 digits with a valid check digit");
        }

        debug!(fields = record.fields().count(), unknown = unknown.len(), "Read identity");
        Ok((record, unknown))
    }

    #[instrument(skip(self), fields(generation = %self.generation))]
    fn read_photo(&mut self) -> Result<Photo> {
        let data = self.read_elementary_file(ElementaryFile::Photo, true)?;
        debug!(len = data.len(), "Read photo");
        Photo::from_jpeg(data)
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut transport = self.transport.take().ok_or(Error::NotConnected)?;
        info!(generation = %self.generation, "Disconnecting identity card");
        transport.disconnect().map_err(Error::transport)
    }
}

/// Exclusive hold on the card, released on drop
struct ExclusiveSession<'a, T: CardTransport> {
    transport: &'a mut T,
}

impl<'a, T: CardTransport> ExclusiveSession<'a, T> {
    fn begin(transport: &'a mut T) -> Result<Self> {
        transport.begin_exclusive().map_err(Error::transport)?;
        trace!("Exclusive session started");
        Ok(Self { transport })
    }

    fn transport(&mut self) -> &mut T {
        self.transport
    }
}

impl<T: CardTransport> Drop for ExclusiveSession<'_, T> {
    fn drop(&mut self) {
        match self.transport.end_exclusive() {
            Ok(()) => trace!("Exclusive session ended"),
            Err(e) => warn!(error = ?e, "Failed to end exclusive session"),
        }
    }
}

/// Read a whole elementary file the way the card generation lays it out
pub(crate) fn read_elementary_file<T: CardTransport + ?Sized>(
    transport: &mut T,
    generation: CardGeneration,
    file: ElementaryFile,
    strip_inner_framing: bool,
) -> Result<Bytes> {
    let data = match generation {
        CardGeneration::Apollo => read_apollo_file(transport, file, strip_inner_framing)?,
        CardGeneration::Gemalto | CardGeneration::SmartCafe => {
            read_framed_file(transport, file, strip_inner_framing)?
        }
    };
    debug!(%file, len = data.len(), "Read elementary file");
    Ok(data)
}

/// Apollo files start with a six byte header whose last two bytes are the
/// little-endian content length.
fn read_apollo_file<T: CardTransport + ?Sized>(
    transport: &mut T,
    file: ElementaryFile,
    strip_inner_framing: bool,
) -> Result<Bytes> {
    const HEADER_LEN: usize = 6;

    select_file(transport, file, None)?;
    let header = read_binary(transport, 0, HEADER_LEN as u8)?;
    if header.len() < HEADER_LEN {
        return Err(Error::ShortRead {
            file,
            offset: header.len(),
            expected: HEADER_LEN - header.len(),
        });
    }
    if header.iter().all(|&b| b == 0xFF) {
        return Err(Error::MissingFile { file });
    }

    let mut length = usize::from(u16::from_le_bytes([header[4], header[5]]));
    let mut offset = HEADER_LEN;
    if strip_inner_framing {
        length = length.saturating_sub(4);
        offset += 4;
    }

    let mut out = BytesMut::with_capacity(length);
    read_range(transport, file, offset, length, &mut out)?;
    Ok(out.freeze())
}

/// Gemalto and SmartCafe files start with a four byte record header whose last
/// two bytes are the little-endian content length. The file info returned by
/// SELECT only gives a provisional size.
fn read_framed_file<T: CardTransport + ?Sized>(
    transport: &mut T,
    file: ElementaryFile,
    strip_inner_framing: bool,
) -> Result<Bytes> {
    const HEADER_LEN: usize = 4;

    let info = select_file(transport, file, Some(HEADER_LEN as u8))?;
    if info.len() < HEADER_LEN {
        return Err(Error::ShortRead {
            file,
            offset: 0,
            expected: HEADER_LEN,
        });
    }
    let provisional = usize::from(u16::from_be_bytes([info[2], info[3]]));
    if provisional == 0 {
        return Ok(Bytes::new());
    }

    let first_len = provisional.min(usize::from(MAX_READ_LENGTH)) as u8;
    let first = read_binary(transport, 0, first_len)?;
    if first.len() < HEADER_LEN {
        return Err(Error::ShortRead {
            file,
            offset: first.len(),
            expected: HEADER_LEN - first.len(),
        });
    }

    let end = HEADER_LEN + usize::from(u16::from_le_bytes([first[2], first[3]]));
    let mut raw = BytesMut::with_capacity(end);
    raw.extend_from_slice(&first);
    if raw.len() < end {
        let offset = raw.len();
        read_range(transport, file, offset, end - offset, &mut raw)?;
    }
    raw.truncate(end);

    let skip = if strip_inner_framing { 2 * HEADER_LEN } else { HEADER_LEN };
    let mut raw = raw.freeze();
    Ok(if raw.len() > skip { raw.split_off(skip) } else { Bytes::new() })
}

/// Append `length` bytes of the selected file starting at `offset`
fn read_range<T: CardTransport + ?Sized>(
    transport: &mut T,
    file: ElementaryFile,
    mut offset: usize,
    mut length: usize,
    out: &mut BytesMut,
) -> Result<()> {
    while length > 0 {
        let short_read = Error::ShortRead {
            file,
            offset,
            expected: length,
        };
        let Ok(address) = u16::try_from(offset) else {
            return Err(short_read);
        };
        let chunk = length.min(usize::from(MAX_READ_LENGTH)) as u8;

        let data = read_binary(transport, address, chunk)?;
        if data.is_empty() {
            return Err(short_read);
        }
        out.extend_from_slice(&data);
        offset += data.len();
        length = length.saturating_sub(data.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::FieldTag;
    use crate::testing::{MockTransport, SimulatedCard, sample_jpeg, tlv};
    use eid_apdu_core::TransportError;
    use hex_literal::hex;

    fn personal_file() -> Vec<u8> {
        [
            tlv(1558, b"0101990710008"),
            tlv(1559, b"Petrovi\xC4\x87"),
            tlv(1560, b"Petar"),
            tlv(1561, b"Marko"),
            tlv(1567, b"SRB"),
        ]
        .concat()
    }

    #[test]
    fn test_apollo_read_sequence() {
        let mut transport = MockTransport::new()
            .respond(hex!("9000"))
            .respond(hex!("0000000007009000"))
            .respond(hex!("0A0603004142439000"));
        let data =
            read_elementary_file(&mut transport, CardGeneration::Apollo, ElementaryFile::Document, false)
                .unwrap();
        assert_eq!(data.as_ref(), hex!("0A060300414243"));

        let commands = transport.commands();
        assert_eq!(commands[0].as_ref(), hex!("00A40800020F02"));
        assert_eq!(commands[1].as_ref(), hex!("00B0000006"));
        assert_eq!(commands[2].as_ref(), hex!("00B0000607"));
    }

    #[test]
    fn test_apollo_missing_file() {
        let mut transport = MockTransport::new()
            .respond(hex!("9000"))
            .respond(hex!("FFFFFFFFFFFF9000"));
        let err =
            read_elementary_file(&mut transport, CardGeneration::Apollo, ElementaryFile::Residence, false)
                .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingFile {
                file: ElementaryFile::Residence
            }
        ));
    }

    #[test]
    fn test_apollo_long_file_is_chunked() {
        let payload: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        let card = SimulatedCard::new(CardGeneration::Apollo)
            .with_file(ElementaryFile::Document, payload.clone());
        let mut transport = MockTransport::simulated(card);

        let data =
            read_elementary_file(&mut transport, CardGeneration::Apollo, ElementaryFile::Document, false)
                .unwrap();
        assert_eq!(data.as_ref(), payload.as_slice());

        let reads: Vec<_> = transport
            .commands()
            .into_iter()
            .filter(|c| c[1] == 0xB0)
            .map(|c| (u16::from_be_bytes([c[2], c[3]]), c[4]))
            .collect();
        assert_eq!(reads, vec![(0, 6), (6, 0xFF), (261, 0xFF), (516, 90)]);
    }

    #[test]
    fn test_framed_read_sequence() {
        let mut transport = MockTransport::new()
            .respond(hex!("0000000B9000"))
            .respond(hex!("0F0207000A0603004142439000"));
        let data =
            read_elementary_file(&mut transport, CardGeneration::Gemalto, ElementaryFile::Document, false)
                .unwrap();
        assert_eq!(data.as_ref(), hex!("0A060300414243"));

        let commands = transport.commands();
        assert_eq!(commands[0].as_ref(), hex!("00A40800020F0204"));
        assert_eq!(commands[1].as_ref(), hex!("00B000000B"));
        assert_eq!(commands.len(), 2);
    }

    #[test]
    fn test_framed_strip_inner_framing() {
        let jpeg = sample_jpeg();
        let card = SimulatedCard::new(CardGeneration::SmartCafe).with_file(ElementaryFile::Photo, jpeg.to_vec());
        let mut transport = MockTransport::simulated(card);
        select_application(&mut transport, &crate::commands::IDENTITY_AID).unwrap();

        let data =
            read_elementary_file(&mut transport, CardGeneration::SmartCafe, ElementaryFile::Photo, true)
                .unwrap();
        assert_eq!(data, jpeg);
    }

    #[test]
    fn test_open_recognizes_generation() {
        for (generation, selects_aid) in [
            (CardGeneration::Apollo, false),
            (CardGeneration::Gemalto, true),
            (CardGeneration::SmartCafe, true),
        ] {
            let transport = MockTransport::simulated(SimulatedCard::new(generation));
            let card = EidCard::open(transport.clone()).unwrap();
            assert_eq!(card.generation(), generation);
            assert!(card.is_connected());

            let selected = transport
                .commands()
                .iter()
                .any(|c| c.as_ref() == hex!("00A404000BF381000002534552494401"));
            assert_eq!(selected, selects_aid);
        }
    }

    #[test]
    fn test_open_rejects_unknown_card() {
        let transport = MockTransport::simulated(SimulatedCard::unrecognized(hex!("3B8F8001")));
        let err = EidCard::open(transport.clone()).unwrap_err();
        assert!(matches!(err, Error::UnrecognizedCard { .. }));
        assert!(!transport.is_connected());
        assert!(transport.commands().is_empty());
    }

    #[test]
    fn test_open_fails_when_application_select_fails() {
        let transport = MockTransport::new()
            .with_atr(atr::KNOWN_ATRS[1].0)
            .respond(hex!("6A82"));
        let err = EidCard::open(transport).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_read_identity() {
        let card = SimulatedCard::new(CardGeneration::Gemalto)
            .with_file(ElementaryFile::Document, tlv(1546, b"009876543"))
            .with_file(ElementaryFile::Personal, personal_file())
            .with_file(
                ElementaryFile::Residence,
                [tlv(1568, b"SRB"), tlv(1576, b"extra")].concat(),
            );
        let transport = MockTransport::simulated(card);
        let mut card = EidCard::open(transport.clone()).unwrap();

        let (record, unknown) = card.read_identity_with_diagnostics().unwrap();
        assert_eq!(record.doc_reg_no(), Some("009876543"));
        assert_eq!(record.surname(), Some("Petrović"));
        assert_eq!(record.full_name(), "Petar Marko Petrović");
        assert_eq!(record.get(FieldTag::State), Some("SRB"));
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].file, ElementaryFile::Residence);
        assert_eq!(unknown[0].tag, 1576);

        assert_eq!(transport.exclusive_begins(), 1);
        assert_eq!(transport.exclusive_ends(), 1);
    }

    #[test]
    fn test_exclusive_released_on_failure() {
        let card = SimulatedCard::new(CardGeneration::Apollo)
            .with_file(ElementaryFile::Document, tlv(1546, b"009876543"))
            .with_file(ElementaryFile::Personal, personal_file())
            .with_file(ElementaryFile::Residence, tlv(1568, b"SRB"))
            .with_faulty_file(ElementaryFile::Personal);
        let transport = MockTransport::simulated(card);
        let mut card = EidCard::open(transport.clone()).unwrap();

        let err = card.read_identity().unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Transmission)));
        assert_eq!(transport.exclusive_begins(), 1);
        assert_eq!(transport.exclusive_ends(), 1);
    }

    #[test]
    fn test_malformed_record_fails_read() {
        let card = SimulatedCard::new(CardGeneration::Apollo)
            .with_file(ElementaryFile::Document, hex!("0A060900414243").to_vec())
            .with_file(ElementaryFile::Personal, personal_file())
            .with_file(ElementaryFile::Residence, tlv(1568, b"SRB"));
        let transport = MockTransport::simulated(card);
        let mut card = EidCard::open(transport.clone()).unwrap();

        let err = card.read_identity().unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { tag: 1546, declared: 9, remaining: 3 }));
        assert_eq!(transport.exclusive_ends(), 1);
    }

    #[test]
    fn test_read_photo() {
        let jpeg = sample_jpeg();
        let card = SimulatedCard::new(CardGeneration::Apollo).with_file(ElementaryFile::Photo, jpeg.to_vec());
        let transport = MockTransport::simulated(card);
        let mut card = EidCard::open(transport.clone()).unwrap();

        let photo = card.read_photo().unwrap();
        assert_eq!(photo.as_bytes(), jpeg.as_ref());
        assert_eq!(transport.exclusive_begins(), 1);
        assert_eq!(transport.exclusive_ends(), 1);
    }

    #[test]
    fn test_invalid_photo_releases_exclusive() {
        let card = SimulatedCard::new(CardGeneration::Gemalto)
            .with_file(ElementaryFile::Photo, b"not a jpeg at all".to_vec());
        let transport = MockTransport::simulated(card);
        let mut card = EidCard::open(transport.clone()).unwrap();

        assert!(matches!(card.read_photo(), Err(Error::InvalidPhoto)));
        assert_eq!(transport.exclusive_begins(), 1);
        assert_eq!(transport.exclusive_ends(), 1);
    }

    #[test]
    fn test_disconnect_once() {
        let transport = MockTransport::simulated(SimulatedCard::new(CardGeneration::Apollo));
        let mut card = EidCard::open(transport.clone()).unwrap();

        card.disconnect().unwrap();
        assert!(!card.is_connected());
        assert!(!transport.is_connected());
        assert_eq!(transport.disconnects(), 1);

        assert!(matches!(card.disconnect(), Err(Error::NotConnected)));
        assert!(matches!(card.read_identity(), Err(Error::NotConnected)));
        assert!(matches!(card.read_photo(), Err(Error::NotConnected)));
        assert_eq!(transport.disconnects(), 1);
        assert_eq!(transport.exclusive_begins(), 0);
    }
}
