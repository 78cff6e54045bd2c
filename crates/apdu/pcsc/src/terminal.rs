//! PC/SC card terminal

use std::ffi::CString;
use std::fmt;
use std::time::Duration;

use eid_apdu_core::CardTerminal;
use pcsc::{Context, ReaderState, State};
use tracing::trace;

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::card_present;
use crate::transport::PcscTransport;

/// One PC/SC reader slot
pub struct PcscTerminal {
    /// PC/SC context
    context: Context,
    /// Reader name as passed to the driver
    reader: CString,
    /// Reader name for display
    name: String,
    /// Configuration for transports opened on this terminal
    config: PcscConfig,
}

impl fmt::Debug for PcscTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTerminal")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTerminal {
    pub(crate) fn new(context: Context, name: &str, config: PcscConfig) -> Result<Self, PcscError> {
        let reader =
            CString::new(name).map_err(|_| PcscError::ReaderNotFound(name.to_string()))?;
        Ok(Self {
            context,
            reader,
            name: name.to_string(),
            config,
        })
    }

    fn current_state(&self) -> Result<ReaderState, PcscError> {
        let mut states = [ReaderState::new(self.reader.clone(), State::UNAWARE)];
        self.context.get_status_change(None, &mut states)?;
        let [state] = states;
        Ok(state)
    }

    /// Wait until card presence equals `present`, returning whether it does
    fn wait_for(&self, present: bool, timeout: Duration) -> Result<bool, PcscError> {
        let state = self.current_state()?;
        if card_present(state.event_state()) == present {
            return Ok(true);
        }

        let mut states = [state];
        states[0].sync_current_state();
        match self.context.get_status_change(Some(timeout), &mut states) {
            Ok(()) => {}
            Err(pcsc::Error::Timeout) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let now_present = card_present(states[0].event_state());
        trace!(reader = %self.name, present = now_present, "Reader state changed");
        Ok(now_present == present)
    }
}

impl CardTerminal for PcscTerminal {
    type Transport = PcscTransport;
    type Error = PcscError;

    fn name(&self) -> &str {
        &self.name
    }

    fn is_card_present(&self) -> Result<bool, Self::Error> {
        Ok(card_present(self.current_state()?.event_state()))
    }

    fn wait_for_card_present(&self, timeout: Duration) -> Result<bool, Self::Error> {
        self.wait_for(true, timeout)
    }

    fn wait_for_card_absent(&self, timeout: Duration) -> Result<bool, Self::Error> {
        self.wait_for(false, timeout)
    }

    fn connect(&self) -> Result<Self::Transport, Self::Error> {
        match self.context.connect(
            &self.reader,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => Ok(PcscTransport::new(card, self.name.clone(), self.config)),
            Err(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard) => {
                Err(PcscError::NoCard(self.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
