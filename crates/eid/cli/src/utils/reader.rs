use eid_apdu_transport_pcsc::{PcscDeviceManager, PcscError, PcscReader};

/// Find a reader with a specific name
pub(crate) fn find_reader_by_name(
    manager: &PcscDeviceManager,
    reader_name: &str,
) -> Result<PcscReader, Box<dyn std::error::Error>> {
    let readers = manager.list_readers()?;

    readers
        .iter()
        .find(|r| r.name() == reader_name)
        .cloned()
        .ok_or_else(|| format!("Reader '{reader_name}' not found").into())
}

/// Print all available readers
pub(crate) fn list_readers(manager: &PcscDeviceManager) -> Result<(), Box<dyn std::error::Error>> {
    let readers = match manager.list_readers() {
        Ok(readers) => readers,
        Err(PcscError::NoReadersAvailable) => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    if readers.is_empty() {
        println!("No readers found!");
        return Ok(());
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = match reader.atr() {
            Some(atr) => match eid_card::classify(atr) {
                Ok(generation) => format!("{generation} eID card"),
                Err(_) => "unrecognized card".to_owned(),
            },
            None => "no card".to_owned(),
        };
        println!("{}. {} ({})", i + 1, reader.name(), status);
    }

    Ok(())
}

/// Find a reader with a card inserted
pub(crate) fn find_reader_with_card(
    manager: &PcscDeviceManager,
) -> Result<PcscReader, Box<dyn std::error::Error>> {
    let readers = manager.list_readers()?;

    let reader = readers
        .iter()
        .find(|r| r.has_card())
        .ok_or("No card found in any reader!")?;

    Ok(reader.clone())
}

/// First reader, whether or not it holds a card
pub(crate) fn first_reader(
    manager: &PcscDeviceManager,
) -> Result<PcscReader, Box<dyn std::error::Error>> {
    let readers = manager.list_readers()?;
    Ok(readers.into_iter().next().ok_or("No readers found!")?)
}
