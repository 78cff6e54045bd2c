//! Presence monitor state machine against a scripted reader

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::Receiver;
use eid_card::testing::{ScriptedTerminal, SimulatedCard, tlv};
use eid_card::{
    CardEvent, CardGeneration, CardHandle, ElementaryFile, Error, FnListener, MonitorConfig,
    PollingStrategy, PresenceMonitor, ReaderListener, card_event_channel,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(150);

fn config() -> MonitorConfig {
    MonitorConfig::default()
        .with_strategy(PollingStrategy::Blocking {
            timeout: Duration::from_millis(10),
        })
        .with_fault_backoff(Duration::from_millis(10))
}

fn card(generation: CardGeneration) -> SimulatedCard {
    SimulatedCard::new(generation)
        .with_file(ElementaryFile::Document, tlv(1546, b"009876543"))
        .with_file(ElementaryFile::Personal, tlv(1560, b"ANA"))
        .with_file(ElementaryFile::Residence, tlv(1568, b"SRB"))
}

fn listen(monitor: &PresenceMonitor) -> Receiver<CardEvent> {
    let (tx, rx) = card_event_channel();
    monitor.add_listener(Arc::new(tx));
    rx
}

fn expect_inserted(rx: &Receiver<CardEvent>) -> CardHandle {
    match rx.recv_timeout(EVENT_TIMEOUT) {
        Ok(CardEvent::Inserted(card)) => card,
        other => panic!("expected insertion, got {other:?}"),
    }
}

fn expect_removed(rx: &Receiver<CardEvent>) {
    match rx.recv_timeout(EVENT_TIMEOUT) {
        Ok(CardEvent::Removed) => {}
        other => panic!("expected removal, got {other:?}"),
    }
}

fn expect_quiet(rx: &Receiver<CardEvent>) {
    if let Ok(event) = rx.recv_timeout(QUIET_PERIOD) {
        panic!("unexpected event {event:?}");
    }
}

#[test]
fn insert_then_remove() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    assert_eq!(monitor.reader(), "Reader 0");
    let events = listen(&monitor);
    expect_quiet(&events);

    terminal.insert(card(CardGeneration::Gemalto));
    let handle = expect_inserted(&events);
    assert_eq!(handle.generation(), CardGeneration::Gemalto);
    assert!(monitor.current_card().is_some_and(|c| c.same_card(&handle)));
    assert_eq!(handle.read_identity().unwrap().given_name(), Some("ANA"));

    terminal.remove();
    expect_removed(&events);
    assert!(!handle.is_connected());
    assert!(matches!(handle.read_identity(), Err(Error::NotConnected)));
    assert!(monitor.current_card().is_none());
    expect_quiet(&events);
}

#[test]
fn unrecognized_card_emits_nothing() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    let events = listen(&monitor);

    terminal.insert(SimulatedCard::unrecognized([0x3B, 0x8F, 0x80, 0x01]));
    expect_quiet(&events);
    assert!(terminal.connects() >= 1);
    assert!(monitor.current_card().is_none());

    terminal.remove();
    expect_quiet(&events);

    terminal.insert(card(CardGeneration::Apollo));
    expect_inserted(&events);
}

#[test]
fn late_listener_gets_replayed_insertion_only() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    let early = listen(&monitor);

    terminal.insert(card(CardGeneration::SmartCafe));
    let handle = expect_inserted(&early);

    let late = listen(&monitor);
    match late.try_recv() {
        Ok(CardEvent::Inserted(card)) => assert!(card.same_card(&handle)),
        other => panic!("expected replayed insertion, got {other:?}"),
    }
    expect_quiet(&late);

    terminal.remove();
    expect_removed(&early);
    expect_removed(&late);

    let after = listen(&monitor);
    expect_quiet(&after);
}

#[test]
fn removed_listener_stops_receiving() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();

    let inserted = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&inserted);
    let listener: Arc<dyn ReaderListener> = Arc::new(FnListener::new(
        move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        },
        || {},
    ));
    monitor.add_listener(Arc::clone(&listener));
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::Apollo));
    expect_inserted(&events);
    assert_eq!(inserted.load(Ordering::SeqCst), 1);

    assert!(monitor.remove_listener(&listener));
    assert!(!monitor.remove_listener(&listener));

    terminal.remove();
    expect_removed(&events);
    terminal.insert(card(CardGeneration::Apollo));
    expect_inserted(&events);
    assert_eq!(inserted.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_connect_is_retried_once_in_the_same_cycle() {
    let terminal = ScriptedTerminal::new("Reader 0");
    terminal.fail_next_connects(1);
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::Apollo));
    expect_inserted(&events);
    expect_quiet(&events);
    assert_eq!(terminal.connects(), 2);
}

#[test]
fn repeated_connect_failure_recovers_on_a_later_cycle() {
    let terminal = ScriptedTerminal::new("Reader 0");
    terminal.fail_next_connects(2);
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::Gemalto));
    expect_inserted(&events);
    expect_quiet(&events);
    assert_eq!(terminal.connects(), 3);
}

#[test]
fn read_fault_forces_reconnect() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::SmartCafe).with_faulty_file(ElementaryFile::Residence));
    let first = expect_inserted(&events);
    assert!(first.read_identity().is_err());

    expect_removed(&events);
    let second = expect_inserted(&events);
    assert!(!second.same_card(&first));
    assert!(second.is_connected());
    assert!(matches!(first.read_identity(), Err(Error::NotConnected)));
}

#[test]
fn missing_file_in_listener_read_keeps_session() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();

    let reads = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&reads);
    monitor.add_listener(Arc::new(FnListener::new(
        move |card: CardHandle| {
            let result = card.read_identity();
            assert!(matches!(result, Err(Error::Protocol { .. })), "{result:?}");
            counted.fetch_add(1, Ordering::SeqCst);
        },
        || {},
    )));
    let events = listen(&monitor);

    terminal.insert(
        SimulatedCard::new(CardGeneration::Gemalto)
            .with_file(ElementaryFile::Document, tlv(1546, b"009876543"))
            .with_file(ElementaryFile::Personal, tlv(1560, b"ANA")),
    );
    let handle = expect_inserted(&events);
    expect_quiet(&events);

    assert_eq!(reads.load(Ordering::SeqCst), 1);
    assert_eq!(terminal.connects(), 1);
    assert!(handle.is_connected());
    assert!(monitor.current_card().is_some_and(|c| c.same_card(&handle)));
}

#[test]
fn persistent_read_fault_reconnects_at_backoff_pace() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let config = config().with_fault_backoff(Duration::from_millis(100));
    let monitor = PresenceMonitor::spawn(terminal.clone(), config).unwrap();
    monitor.add_listener(Arc::new(FnListener::new(
        |card: CardHandle| {
            let _ = card.read_identity();
        },
        || {},
    )));
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::Apollo).with_faulty_file(ElementaryFile::Document));
    expect_inserted(&events);
    std::thread::sleep(Duration::from_millis(450));

    // one connect for the insertion, then at most one per backoff period
    assert!(terminal.connects() <= 7, "connects={}", terminal.connects());
    drop(monitor);
}

#[test]
fn stop_disconnects_without_events() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let mut monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::Apollo));
    let handle = expect_inserted(&events);
    assert!(monitor.is_running());

    monitor.stop();
    assert!(!monitor.is_running());
    assert!(!handle.is_connected());
    assert!(monitor.current_card().is_none());
    expect_quiet(&events);
}

#[test]
fn active_probe_detects_insert_and_remove() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let config = config().with_strategy(PollingStrategy::ActiveProbe {
        interval: Duration::from_millis(10),
    });
    let monitor = PresenceMonitor::spawn(terminal.clone(), config).unwrap();
    let events = listen(&monitor);

    terminal.insert(card(CardGeneration::Gemalto));
    let handle = expect_inserted(&events);
    expect_quiet(&events);
    assert!(handle.is_connected());

    terminal.remove();
    expect_removed(&events);
}

#[test]
fn listener_may_read_from_callback() {
    let terminal = ScriptedTerminal::new("Reader 0");
    let monitor = PresenceMonitor::spawn(terminal.clone(), config()).unwrap();

    let (tx, names) = crossbeam_channel::unbounded();
    monitor.add_listener(Arc::new(FnListener::new(
        move |card: CardHandle| {
            let name = card.read_identity().map(|r| r.full_name());
            let _ = tx.send(name.map_err(|e| e.to_string()));
        },
        || {},
    )));

    terminal.insert(card(CardGeneration::Apollo));
    let name = names.recv_timeout(EVENT_TIMEOUT).unwrap().unwrap();
    assert_eq!(name, "ANA  ");
}
