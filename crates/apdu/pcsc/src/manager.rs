//! Device manager for PC/SC operations

use pcsc::{Context, ReaderState, Scope, State};
use tracing::debug;

use crate::config::PcscConfig;
use crate::error::PcscError;
use crate::reader::PcscReader;
use crate::terminal::PcscTerminal;

/// Manager for PC/SC device operations
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    /// PC/SC context
    context: Context,
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = match self.context.list_readers_owned() {
            Ok(readers) => readers,
            Err(pcsc::Error::NoReadersAvailable) => return Err(PcscError::NoReadersAvailable),
            Err(e) => return Err(e.into()),
        };
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut reader_states = [ReaderState::new(reader_name.as_c_str(), State::UNAWARE)];

            match self.context.get_status_change(None, &mut reader_states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&reader_states[0])),
                Err(e) => {
                    debug!(reader = ?reader_name, error = %e, "Reader status unavailable");
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        false,
                        None,
                    ));
                }
            }
        }

        Ok(result)
    }

    /// Open the terminal for a specific reader
    pub fn open_terminal(&self, reader_name: &str) -> Result<PcscTerminal, PcscError> {
        self.open_terminal_with_config(reader_name, PcscConfig::default())
    }

    /// Open the terminal for a specific reader with custom configuration
    pub fn open_terminal_with_config(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTerminal, PcscError> {
        if !self.list_readers()?.iter().any(|r| r.name() == reader_name) {
            return Err(PcscError::ReaderNotFound(reader_name.to_string()));
        }
        PcscTerminal::new(self.context.clone(), reader_name, config)
    }
}
