//! Subcommand implementations

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use eid_apdu_core::CardTerminal;
use eid_apdu_transport_pcsc::PcscDeviceManager;
use eid_card::{
    CardEvent, CardSession, EidCard, MonitorConfig, PollingStrategy, PresenceMonitor,
    card_event_channel,
};
use tracing::{info, warn};

use crate::utils::{display, reader};

pub(crate) fn list_command(manager: &PcscDeviceManager) -> Result<(), Box<dyn Error>> {
    reader::list_readers(manager)
}

pub(crate) fn read_command(
    manager: &PcscDeviceManager,
    reader_name: &str,
    json: bool,
    photo_path: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let terminal = manager.open_terminal(reader_name)?;
    let mut card = EidCard::open(terminal.connect()?)?;
    info!(generation = %card.generation(), "Reading card");

    let (record, unknown) = card.read_identity_with_diagnostics()?;
    let photo = photo_path.map(|_| card.read_photo()).transpose()?;
    card.disconnect()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        display::print_record(card.generation(), &record);
        display::print_unknown_tags(&unknown);
    }

    if let (Some(photo), Some(path)) = (photo, photo_path) {
        std::fs::write(path, photo.as_bytes())?;
        if !json {
            display::print_photo_saved(&photo, path);
        }
    }

    Ok(())
}

pub(crate) fn watch_command(
    manager: &PcscDeviceManager,
    reader_name: &str,
    active_probe: bool,
) -> Result<(), Box<dyn Error>> {
    let terminal = manager.open_terminal(reader_name)?;
    let mut config = MonitorConfig::default();
    if active_probe {
        config = config.with_strategy(PollingStrategy::active_probe());
    }

    let monitor = PresenceMonitor::spawn(terminal, config)?;
    let (tx, events) = card_event_channel();
    monitor.add_listener(Arc::new(tx));
    println!("Watching {} (Ctrl-C to stop)", monitor.reader());

    for event in events.iter() {
        match event {
            CardEvent::Inserted(card) => match card.read_identity() {
                Ok(record) => println!(
                    "Inserted: {} card of {} ({})",
                    card.generation(),
                    record.full_name(),
                    record.doc_reg_no().unwrap_or("no document number")
                ),
                Err(e) => {
                    warn!(error = %e, "Failed to read inserted card");
                    println!("Inserted: {} card, read failed: {e}", card.generation());
                }
            },
            CardEvent::Removed => println!("Removed"),
        }
    }

    Ok(())
}
