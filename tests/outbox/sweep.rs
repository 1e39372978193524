//! Sweeping the outbox: at-least-once delivery through producers.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use relay_rust::outbox::{InMemoryOutbox, TimedOutboxSweeper, TopicCircuitBreaker};
use relay_rust::{InMemoryBus, OutboxStore, OutboxSweeper, ProducerRegistry};

use crate::support::{processor, OrderShipped, TOPIC};

fn sweeper(outbox: &InMemoryOutbox, bus: &InMemoryBus) -> OutboxSweeper {
    OutboxSweeper::new(Arc::new(outbox.clone()), ProducerRegistry::new().with(TOPIC, bus.clone()))
        .with_min_age(Duration::ZERO)
}

#[test]
fn sweep_sends_once_and_marks_dispatched() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let event = OrderShipped::new(1);
    processor(&outbox, &bus).post(&event).unwrap();
    let sweeper = sweeper(&outbox, &bus);

    let first = sweeper.sweep().unwrap();
    assert_eq!(first.dispatched, vec![event.id.clone()]);
    assert!(outbox.get(&event.id).unwrap().unwrap().is_dispatched());

    let second = sweeper.sweep().unwrap();
    assert!(second.dispatched.is_empty());
    assert_eq!(bus.sent_to(TOPIC).len(), 1);
}

#[test]
fn young_records_wait_for_min_age() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    processor(&outbox, &bus).post(&OrderShipped::new(1)).unwrap();

    let result = sweeper(&outbox, &bus).with_min_age(Duration::from_secs(60)).sweep().unwrap();
    assert!(!result.did_work());
    assert!(bus.sent().is_empty());
}

#[test]
fn failed_send_is_retried_by_the_next_sweep() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    processor(&outbox, &bus).post(&OrderShipped::new(1)).unwrap();
    let sweeper = sweeper(&outbox, &bus);

    bus.fail_topic(TOPIC);
    let failed = sweeper.sweep().unwrap();
    assert_eq!(failed.failed, 1);
    assert_eq!(outbox.outstanding_count().unwrap(), 1);

    bus.restore_topic(TOPIC);
    let retried = sweeper.sweep().unwrap();
    assert_eq!(retried.dispatched.len(), 1);
    assert_eq!(outbox.outstanding_count().unwrap(), 0);
}

#[test]
fn repeated_failures_trip_the_topic() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    for order in 0..3 {
        processor.post(&OrderShipped::new(order)).unwrap();
    }
    let sweeper =
        sweeper(&outbox, &bus).with_breaker(TopicCircuitBreaker::new(2, Duration::from_secs(60)));

    bus.fail_topic(TOPIC);
    let result = sweeper.sweep().unwrap();
    assert_eq!(result.failed, 2);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.tripped, vec![TOPIC.to_string()]);

    // the tripped topic is excluded from the next read entirely
    bus.restore_topic(TOPIC);
    assert!(!sweeper.sweep().unwrap().did_work());
}

#[test]
fn missing_producer_leaves_records_outstanding() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    processor(&outbox, &bus).post(&OrderShipped::new(1)).unwrap();

    let sweeper = OutboxSweeper::new(Arc::new(outbox.clone()), ProducerRegistry::new())
        .with_min_age(Duration::ZERO);
    let result = sweeper.sweep().unwrap();
    assert_eq!(result.no_producer, 1);
    assert_eq!(outbox.outstanding_count().unwrap(), 1);
}

#[test]
fn clear_outbox_sends_specific_ids_now() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let first = processor.deposit_post(&OrderShipped::new(1), None).unwrap();
    let second = processor.deposit_post(&OrderShipped::new(2), None).unwrap();

    let result = processor.clear_outbox(&[first.clone()]).unwrap();
    assert_eq!(result.dispatched, vec![first.clone()]);
    assert_eq!(bus.sent().len(), 1);
    assert!(!outbox.get(&second).unwrap().unwrap().is_dispatched());

    // already dispatched and unknown ids are skipped
    let again = processor.clear_outbox(&[first, "missing".to_string()]).unwrap();
    assert!(again.dispatched.is_empty());
    assert_eq!(bus.sent().len(), 1);
}

#[test]
fn background_sweeper_delivers_concurrent_posts_exactly_once() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let worker = TimedOutboxSweeper::spawn(
        sweeper(&outbox, &bus).with_batch_size(25),
        Duration::from_millis(5),
    );

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let processor = processor.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    processor.post(&OrderShipped::new(t * 100 + i)).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while outbox.outstanding_count().unwrap() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let stats = worker.stop();

    let sent = bus.sent_to(TOPIC);
    let unique: HashSet<&str> = sent.iter().map(|m| m.id()).collect();
    assert_eq!(sent.len(), 200);
    assert_eq!(unique.len(), 200);
    assert_eq!(stats.messages_dispatched, 200);
}
