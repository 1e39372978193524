//! Archiving dispatched records.

use std::sync::Arc;
use std::time::Duration;

use relay_rust::outbox::{InMemoryOutbox, JsonLinesArchive, OutboxArchiver};
use relay_rust::{InMemoryBus, OutboxRecord, OutboxStore};

use crate::support::{processor, OrderShipped};

#[test]
fn dispatched_records_are_archived_then_deleted() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let sent = processor.deposit_post(&OrderShipped::new(1), None).unwrap();
    let pending = processor.deposit_post(&OrderShipped::new(2), None).unwrap();
    processor.clear_outbox(&[sent.clone()]).unwrap();

    let mut archiver =
        OutboxArchiver::new(Arc::new(outbox.clone()), JsonLinesArchive::new(Vec::new()))
            .with_retention(Duration::ZERO);
    assert_eq!(archiver.archive().unwrap(), 1);

    assert!(outbox.get(&sent).unwrap().is_none());
    assert!(outbox.get(&pending).unwrap().is_some());

    let written = String::from_utf8(archiver.into_provider().into_inner()).unwrap();
    let records: Vec<OutboxRecord> = written
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id(), sent);
    assert!(records[0].is_dispatched());
}

#[test]
fn records_within_retention_are_kept() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let id = processor.deposit_post(&OrderShipped::new(1), None).unwrap();
    processor.clear_outbox(&[id.clone()]).unwrap();

    let mut archiver =
        OutboxArchiver::new(Arc::new(outbox.clone()), JsonLinesArchive::new(Vec::new()))
            .with_retention(Duration::from_secs(3600));
    assert_eq!(archiver.archive().unwrap(), 0);
    assert!(outbox.get(&id).unwrap().is_some());
}
