//! Post on one side, consume on the other.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_rust::channel::InMemoryChannelFactory;
use relay_rust::outbox::{InMemoryOutbox, TimedOutboxSweeper};
use relay_rust::{
    CommandProcessor, Dispatcher, InMemoryBus, Lifetime, OutboxSweeper, ProducerRegistry,
    Publication, Subscription,
};

use crate::support::{wait_until, IssueInvoice, IssueInvoiceHandler, TOPIC};

fn subscription() -> Subscription {
    Subscription::new("invoicing", "invoices-channel", TOPIC)
        .with_performers(2)
        .with_buffer_size(3)
        .with_timeout(Duration::from_millis(5))
        .with_empty_channel_delay(Duration::from_millis(1))
}

#[test]
fn posted_commands_reach_their_handler_through_the_pump() {
    let (outbox, bus) = (InMemoryOutbox::new(), InMemoryBus::new());
    let issued = Arc::new(AtomicUsize::new(0));
    let handler_count = issued.clone();
    let processor = Arc::new(
        CommandProcessor::builder()
            .with_handler::<IssueInvoice, IssueInvoiceHandler, _>(Lifetime::Transient, move || {
                IssueInvoiceHandler { issued: handler_count.clone() }
            })
            .with_json_mapper::<IssueInvoice>(Publication::command(TOPIC))
            .with_outbox(outbox.clone())
            .build()
            .unwrap(),
    );

    let producers = ProducerRegistry::new().with(TOPIC, bus.clone());
    let sweeper = TimedOutboxSweeper::spawn(
        OutboxSweeper::new(Arc::new(outbox.clone()), producers).with_min_age(Duration::ZERO),
        Duration::from_millis(5),
    );
    let factory = InMemoryChannelFactory::new(bus.clone());
    let mut dispatcher = Dispatcher::new(processor.clone(), factory)
        .with_command::<IssueInvoice>(subscription())
        .unwrap();
    dispatcher.receive().unwrap();

    for amount in 1..=20 {
        processor.post(&IssueInvoice::new(amount)).unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || issued.load(Ordering::SeqCst) == 20));
    let results = dispatcher.end();
    sweeper.stop();

    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().map(|(_, stats)| stats.handled).sum::<usize>(), 20);
    assert_eq!(bus.acknowledged().len(), 20);
}

#[test]
fn deferred_command_is_dead_lettered_after_its_attempts() {
    let bus = InMemoryBus::new();
    let issued = Arc::new(AtomicUsize::new(0));
    let handler_count = issued.clone();
    let processor = Arc::new(
        CommandProcessor::builder()
            .with_handler::<IssueInvoice, IssueInvoiceHandler, _>(Lifetime::Transient, move || {
                IssueInvoiceHandler { issued: handler_count.clone() }
            })
            .with_json_mapper::<IssueInvoice>(Publication::command(TOPIC))
            .build()
            .unwrap(),
    );
    let factory = InMemoryChannelFactory::new(bus.clone());
    let mut dispatcher = Dispatcher::new(processor.clone(), factory)
        .with_command::<IssueInvoice>(subscription().with_requeue(Some(2), Duration::ZERO))
        .unwrap();
    dispatcher.receive().unwrap();

    let unpriced = processor.mappers().to_message(&IssueInvoice::new(0)).unwrap();
    relay_rust::Producer::send(&bus, &unpriced).unwrap();

    assert!(wait_until(Duration::from_secs(5), || bus.dead_letters().len() == 1));
    let results = dispatcher.end();

    assert_eq!(results.iter().map(|(_, stats)| stats.requeued).sum::<usize>(), 1);
    assert_eq!(bus.dead_letters()[0].id(), unpriced.id());
    assert_eq!(issued.load(Ordering::SeqCst), 0);
}
