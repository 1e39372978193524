//! Depositing messages: post, deposit_post and transactions.

use std::time::Duration;

use relay_rust::outbox::InMemoryOutbox;
use relay_rust::{InMemoryBus, MessageType, OutboxStore};

use crate::support::{processor, OrderShipped, TOPIC};

#[test]
fn post_deposits_without_sending() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let event = OrderShipped::new(7);

    processor.post(&event).unwrap();

    assert!(bus.sent().is_empty());
    let record = outbox.get(&event.id).unwrap().unwrap();
    assert_eq!(record.topic(), TOPIC);
    assert_eq!(record.message.message_type(), MessageType::Event);
    assert_eq!(record.message.body.decode_json::<OrderShipped>().unwrap(), event);
}

#[test]
fn posting_the_same_request_twice_keeps_one_record() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let event = OrderShipped::new(7);

    processor.post(&event).unwrap();
    processor.post(&event).unwrap();

    assert_eq!(outbox.outstanding_count().unwrap(), 1);
}

#[test]
fn rolled_back_deposit_is_never_outstanding() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);

    let mut committed = outbox.begin();
    let m1 = processor.deposit_post(&OrderShipped::new(1), Some(&mut committed)).unwrap();
    committed.commit().unwrap();

    let mut rolled_back = outbox.begin();
    let m2 = processor.deposit_post(&OrderShipped::new(2), Some(&mut rolled_back)).unwrap();
    rolled_back.rollback();

    let outstanding = outbox.outstanding_messages(Duration::ZERO, &[], 10).unwrap();
    let ids: Vec<&str> = outstanding.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec![m1.as_str()]);
    assert!(outbox.get(&m2).unwrap().is_none());
}

#[test]
fn uncommitted_deposit_is_invisible_to_readers() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);

    let mut tx = outbox.begin();
    let id = processor.deposit_post(&OrderShipped::new(1), Some(&mut tx)).unwrap();
    assert!(outbox.get(&id).unwrap().is_none());

    tx.commit().unwrap();
    assert!(outbox.get(&id).unwrap().is_some());
}

#[test]
fn foreign_transaction_type_is_rejected() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);
    let mut not_a_transaction = String::from("tx");

    let err = processor
        .deposit_post(&OrderShipped::new(1), Some(&mut not_a_transaction))
        .unwrap_err();
    assert!(matches!(
        err,
        relay_rust::DispatchError::Outbox(relay_rust::OutboxError::UnsupportedTransaction)
    ));
}

#[test]
fn tripped_topics_are_excluded_from_outstanding() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    processor(&outbox, &bus).post(&OrderShipped::new(1)).unwrap();

    let tripped = vec![TOPIC.to_string()];
    assert!(outbox.outstanding_messages(Duration::ZERO, &tripped, 10).unwrap().is_empty());
    assert_eq!(outbox.outstanding_messages(Duration::ZERO, &[], 10).unwrap().len(), 1);
}

#[test]
fn concurrent_posts_are_all_recorded() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let processor = processor(&outbox, &bus);

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let processor = processor.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    processor.post(&OrderShipped::new(t * 100 + i)).unwrap();
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }

    assert_eq!(outbox.outstanding_count().unwrap(), 400);
}
