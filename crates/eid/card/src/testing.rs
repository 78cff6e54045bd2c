//! Scripted transports and terminals for exercising card code without hardware
//!
//! [`MockTransport`] either replays canned responses or answers from a
//! [`SimulatedCard`] that lays its files out the way each card generation does.
//! [`ScriptedTerminal`] lets a test insert and remove simulated cards while a
//! presence monitor watches it.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use eid_apdu_core::{CardTerminal, CardTransport, TransportError};
use parking_lot::Mutex;

use crate::atr::{CardGeneration, KNOWN_ATRS};
use crate::commands::{ElementaryFile, IDENTITY_AID};

/// Encode one record: little-endian tag, little-endian length, value
pub fn tlv(tag: u16, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + value.len());
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
    out
}

/// Smallest well-formed JPEG stream the photo decoder accepts, 48 by 64 pixels
pub fn sample_jpeg() -> Bytes {
    Bytes::from_static(&[
        // SOI
        0xFF, 0xD8,
        // APP0 JFIF
        0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x00, 0x00, 0x01,
        0x00, 0x01, 0x00, 0x00,
        // SOF0: 8 bit, height 64, width 48, one component
        0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x40, 0x00, 0x30, 0x01, 0x01, 0x11, 0x00,
        // SOS
        0xFF, 0xDA, 0x00, 0x08, 0x01, 0x01, 0x00, 0x00, 0x3F, 0x00,
        // entropy coded data
        0x12, 0x34, 0x56,
        // EOI
        0xFF, 0xD9,
    ])
}

/// An identity card answering SELECT and READ BINARY from in-memory files
#[derive(Debug, Clone)]
pub struct SimulatedCard {
    atr: Bytes,
    generation: Option<CardGeneration>,
    files: HashMap<ElementaryFile, Vec<u8>>,
    faulty: Option<ElementaryFile>,
}

impl SimulatedCard {
    /// Card of a known generation with no files
    ///
    /// Files that are never set read as missing.
    pub fn new(generation: CardGeneration) -> Self {
        let atr = KNOWN_ATRS
            .iter()
            .find(|(_, known)| *known == generation)
            .map(|(atr, _)| Bytes::from_static(*atr))
            .unwrap_or_default();
        Self {
            atr,
            generation: Some(generation),
            files: HashMap::new(),
            faulty: None,
        }
    }

    /// Card with an ATR no generation matches
    pub fn unrecognized(atr: impl AsRef<[u8]>) -> Self {
        Self {
            atr: Bytes::copy_from_slice(atr.as_ref()),
            generation: None,
            files: HashMap::new(),
            faulty: None,
        }
    }

    /// Store `content` in `file`
    ///
    /// For [`ElementaryFile::Photo`] the content is the bare JPEG; the inner record
    /// header is added by the card.
    pub fn with_file(mut self, file: ElementaryFile, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(file, content.into());
        self
    }

    /// Make selecting `file` fail at the transport level
    pub fn with_faulty_file(mut self, file: ElementaryFile) -> Self {
        self.faulty = Some(file);
        self
    }

    /// Answer-to-reset of the card
    pub fn atr(&self) -> &Bytes {
        &self.atr
    }

    fn needs_application(&self) -> bool {
        self.generation
            .is_some_and(|g| g.application_id().is_some())
    }

    /// The file as it is laid out on the card
    fn image(&self, file: ElementaryFile) -> Option<Vec<u8>> {
        let content = self.files.get(&file)?;
        let content = if file == ElementaryFile::Photo {
            let mut framed = tlv(0x0001, &[]);
            framed[2..4].copy_from_slice(&(content.len() as u16).to_le_bytes());
            framed.extend_from_slice(content);
            framed
        } else {
            content.clone()
        };
        let length = (content.len() as u16).to_le_bytes();

        let mut image = match self.generation? {
            CardGeneration::Apollo => vec![0, 0, 0, 0, length[0], length[1]],
            CardGeneration::Gemalto | CardGeneration::SmartCafe => {
                let id = file.id();
                vec![id[1], id[0], length[0], length[1]]
            }
        };
        image.extend_from_slice(&content);
        Some(image)
    }
}

#[derive(Debug)]
struct CardState {
    card: SimulatedCard,
    selected: Option<Vec<u8>>,
    application_selected: bool,
}

impl CardState {
    fn new(card: SimulatedCard) -> Self {
        Self {
            card,
            selected: None,
            application_selected: false,
        }
    }

    fn answer(&mut self, apdu: &[u8]) -> Result<Bytes, TransportError> {
        const OK: [u8; 2] = [0x90, 0x00];
        const NOT_FOUND: [u8; 2] = [0x6A, 0x82];

        let mut out = BytesMut::new();
        match apdu {
            [0x00, 0xA4, 0x04, 0x00, lc, rest @ ..] => {
                let aid = rest.get(..usize::from(*lc));
                if self.card.needs_application() && aid == Some(&IDENTITY_AID[..]) {
                    self.application_selected = true;
                    out.put_slice(&OK);
                } else {
                    out.put_slice(&NOT_FOUND);
                }
            }
            [0x00, 0xA4, 0x08, 0x00, 0x02, hi, lo, rest @ ..] => {
                let file = [
                    ElementaryFile::Document,
                    ElementaryFile::Personal,
                    ElementaryFile::Residence,
                    ElementaryFile::Photo,
                ]
                .into_iter()
                .find(|f| f.id() == [*hi, *lo]);

                if file.is_some() && file == self.card.faulty {
                    return Err(TransportError::Transmission);
                }
                if self.card.needs_application() && !self.application_selected {
                    out.put_slice(&NOT_FOUND);
                    return Ok(out.freeze());
                }

                match (file.and_then(|f| self.card.image(f)), self.card.needs_application()) {
                    (Some(image), true) => {
                        let le = rest.first().map_or(0, |&le| usize::from(le));
                        let mut info = vec![0x00, 0x00];
                        info.extend_from_slice(&(image.len() as u16).to_be_bytes());
                        info.truncate(le);
                        out.put_slice(&info);
                        out.put_slice(&OK);
                        self.selected = Some(image);
                    }
                    (Some(image), false) => {
                        out.put_slice(&OK);
                        self.selected = Some(image);
                    }
                    // Apollo cards select absent files and report a blank header
                    (None, false) if file.is_some() => {
                        out.put_slice(&OK);
                        self.selected = Some(vec![0xFF; 6]);
                    }
                    (None, _) => {
                        self.selected = None;
                        out.put_slice(&NOT_FOUND);
                    }
                }
            }
            [0x00, 0xB0, hi, lo, le] => {
                let Some(image) = &self.selected else {
                    out.put_slice(&[0x69, 0x86]);
                    return Ok(out.freeze());
                };
                let offset = usize::from(u16::from_be_bytes([*hi, *lo]));
                if offset > image.len() {
                    out.put_slice(&[0x6B, 0x00]);
                    return Ok(out.freeze());
                }
                let le = if *le == 0 { 256 } else { usize::from(*le) };
                let end = image.len().min(offset + le);
                out.put_slice(&image[offset..end]);
                out.put_slice(&OK);
            }
            _ => out.put_slice(&[0x6D, 0x00]),
        }
        Ok(out.freeze())
    }
}

#[derive(Debug)]
enum Reply {
    Data(Bytes),
    Fail(TransportError),
}

#[derive(Default)]
struct MockState {
    atr: Bytes,
    replies: VecDeque<Reply>,
    card: Option<CardState>,
    commands: Vec<Bytes>,
    connected: bool,
    exclusive: bool,
    exclusive_begins: usize,
    exclusive_ends: usize,
    disconnects: usize,
    insertion: Option<(Arc<Mutex<TerminalState>>, u64)>,
}

/// Transport that replays scripted replies, then falls back to a simulated card
///
/// Clones share state, so a test can keep a clone to inspect what was sent after
/// handing the transport to a session.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockTransport")
            .field("atr", &hex::encode_upper(&state.atr))
            .field("connected", &state.connected)
            .field("exclusive", &state.exclusive)
            .field("commands", &state.commands.len())
            .finish()
    }
}

impl MockTransport {
    /// Connected transport with no replies and no card behind it
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..MockState::default()
            })),
        }
    }

    /// Connected transport backed by `card`
    pub fn simulated(card: SimulatedCard) -> Self {
        let transport = Self::new().with_atr(card.atr().clone());
        transport.state.lock().card = Some(CardState::new(card));
        transport
    }

    /// Set the answer-to-reset
    pub fn with_atr(self, atr: impl AsRef<[u8]>) -> Self {
        self.state.lock().atr = Bytes::copy_from_slice(atr.as_ref());
        self
    }

    /// Queue a raw response, status word included
    pub fn respond(self, response: impl AsRef<[u8]>) -> Self {
        let reply = Reply::Data(Bytes::copy_from_slice(response.as_ref()));
        self.state.lock().replies.push_back(reply);
        self
    }

    /// Queue a transport failure
    pub fn fail(self, error: TransportError) -> Self {
        self.state.lock().replies.push_back(Reply::Fail(error));
        self
    }

    fn inserted_as(self, terminal: Arc<Mutex<TerminalState>>, insertion: u64) -> Self {
        self.state.lock().insertion = Some((terminal, insertion));
        self
    }

    /// Every raw command transmitted so far
    pub fn commands(&self) -> Vec<Bytes> {
        self.state.lock().commands.clone()
    }

    /// Number of exclusive sessions started
    pub fn exclusive_begins(&self) -> usize {
        self.state.lock().exclusive_begins
    }

    /// Number of exclusive sessions ended
    pub fn exclusive_ends(&self) -> usize {
        self.state.lock().exclusive_ends
    }

    /// Whether an exclusive session is open
    pub fn is_exclusive(&self) -> bool {
        self.state.lock().exclusive
    }

    /// Number of successful disconnects
    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }
}

impl CardTransport for MockTransport {
    type Error = TransportError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        let removed = state
            .insertion
            .as_ref()
            .is_some_and(|(terminal, insertion)| terminal.lock().insertion != *insertion);
        if removed {
            return Err(TransportError::CardRemoved);
        }

        state.commands.push(Bytes::copy_from_slice(command));
        if let Some(reply) = state.replies.pop_front() {
            return match reply {
                Reply::Data(data) => Ok(data),
                Reply::Fail(error) => Err(error),
            };
        }
        match state.card.as_mut() {
            Some(card) => card.answer(command),
            None => Err(TransportError::other("no scripted reply left")),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn atr(&self) -> Result<Bytes, TransportError> {
        let state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        Ok(state.atr.clone())
    }

    fn begin_exclusive(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.exclusive = true;
        state.exclusive_begins += 1;
        Ok(())
    }

    fn end_exclusive(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.exclusive = false;
        state.exclusive_ends += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }
}

#[derive(Default)]
struct TerminalState {
    card: Option<SimulatedCard>,
    insertion: u64,
    connects: usize,
    failing_connects: usize,
    transports: Vec<MockTransport>,
}

/// Card slot a test inserts simulated cards into and removes them from
#[derive(Clone)]
pub struct ScriptedTerminal {
    name: String,
    state: Arc<Mutex<TerminalState>>,
}

impl fmt::Debug for ScriptedTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ScriptedTerminal")
            .field("name", &self.name)
            .field("card_present", &state.card.is_some())
            .field("connects", &state.connects)
            .finish()
    }
}

impl ScriptedTerminal {
    /// Empty slot
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(TerminalState::default())),
        }
    }

    /// Put `card` in the slot, replacing whatever was there
    pub fn insert(&self, card: SimulatedCard) {
        let mut state = self.state.lock();
        state.card = Some(card);
        state.insertion += 1;
    }

    /// Take the card out; transports connected to it start failing
    pub fn remove(&self) {
        let mut state = self.state.lock();
        state.card = None;
        state.insertion += 1;
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().failing_connects = count;
    }

    /// Number of connect attempts so far
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Every transport handed out so far
    pub fn transports(&self) -> Vec<MockTransport> {
        self.state.lock().transports.clone()
    }

    fn wait_until(
        &self,
        timeout: Duration,
        condition: impl Fn(&TerminalState) -> bool,
    ) -> Result<bool, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if condition(&self.state.lock()) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}

impl CardTerminal for ScriptedTerminal {
    type Transport = MockTransport;
    type Error = TransportError;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_card_present(&self) -> Result<bool, TransportError> {
        Ok(self.state.lock().card.is_some())
    }

    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.wait_until(timeout, |state| state.card.is_some())
    }

    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool, TransportError> {
        self.wait_until(timeout, |state| state.card.is_none())
    }

    fn connect(&self) -> Result<MockTransport, TransportError> {
        let mut state = self.state.lock();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(TransportError::Connection);
        }
        let card = state.card.clone().ok_or(TransportError::NoCard)?;
        let transport =
            MockTransport::simulated(card).inserted_as(Arc::clone(&self.state), state.insertion);
        state.transports.push(transport.clone());
        Ok(transport)
    }
}
