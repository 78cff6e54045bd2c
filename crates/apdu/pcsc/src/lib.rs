//! PC/SC transport implementation for APDU operations
//!
//! This crate implements the `CardTransport` and `CardTerminal` traits from
//! `eid-apdu-core` on top of the PC/SC API, which is how desktop systems talk to
//! USB smart card readers.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use eid_apdu_core::prelude::*;
//! use eid_apdu_transport_pcsc::PcscDeviceManager;
//!
//! let manager = PcscDeviceManager::new()?;
//! let readers = manager.list_readers()?;
//! let Some(reader) = readers.iter().find(|r| r.has_card()) else {
//!     println!("No card inserted");
//!     return Ok(());
//! };
//!
//! let terminal = manager.open_terminal(reader.name())?;
//! let mut transport = terminal.connect()?;
//! let response = transport.transmit(&Command::new_with_data(
//!     0x00,
//!     0xA4,
//!     0x04,
//!     0x00,
//!     vec![0xF3, 0x81, 0x00, 0x00, 0x02, 0x53, 0x45, 0x52, 0x49, 0x44, 0x01],
//! ))?;
//! println!("SELECT answered {}", response.status());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod terminal;
mod transport;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use terminal::PcscTerminal;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
