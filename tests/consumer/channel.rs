//! The channel contract over the in-memory transport.

use std::time::Duration;

use relay_rust::channel::{InMemoryConsumer, MAX_BUFFER_SIZE};
use relay_rust::{Channel, ChannelError, ConfigurationError, InMemoryBus, Producer};

use crate::support::{text, TOPIC};

fn channel(bus: &InMemoryBus, buffer_size: usize) -> Channel {
    let consumer = InMemoryConsumer::new(bus.clone(), TOPIC);
    Channel::new("invoices-channel", TOPIC, consumer, buffer_size).unwrap()
}

#[test]
fn enqueue_one_past_buffer_size_fails() {
    let channel = channel(&InMemoryBus::new(), MAX_BUFFER_SIZE);
    for i in 0..MAX_BUFFER_SIZE {
        channel.enqueue(vec![text(&i.to_string())]).unwrap();
    }

    let err = channel.enqueue(vec![text("overflow")]).unwrap_err();
    assert_eq!(
        err,
        ChannelError::BufferOverflow {
            attempted: MAX_BUFFER_SIZE + 1,
            capacity: MAX_BUFFER_SIZE
        }
    );
}

#[test]
fn unbounded_buffer_is_rejected_at_construction() {
    let result = Channel::new("c", TOPIC, InMemoryConsumer::new(InMemoryBus::new(), TOPIC), 0);
    assert!(matches!(result, Err(ConfigurationError::BufferSize { size: 0, .. })));
}

#[test]
fn stop_is_observed_before_buffered_messages_which_survive() {
    let bus = InMemoryBus::new();
    let channel = channel(&bus, 3);
    for body in ["a", "b", "c"] {
        bus.send(&text(body)).unwrap();
    }
    // pulls all three into the buffer
    assert_eq!(channel.receive(Duration::from_millis(10)).unwrap().body.as_str(), Some("a"));

    channel.stop();

    assert!(channel.receive(Duration::ZERO).unwrap().is_quit());
    assert_eq!(channel.receive(Duration::ZERO).unwrap().body.as_str(), Some("b"));
    assert_eq!(channel.receive(Duration::ZERO).unwrap().body.as_str(), Some("c"));
}

#[test]
fn delayed_requeue_becomes_visible_later() {
    let bus = InMemoryBus::new();
    let channel = channel(&bus, 1);
    bus.send(&text("retry-me")).unwrap();
    let message = channel.receive(Duration::from_millis(10)).unwrap();

    channel.requeue(message, Duration::from_millis(40)).unwrap();
    assert!(channel.receive(Duration::from_millis(5)).unwrap().is_empty());

    let redelivered = channel.receive(Duration::from_millis(500)).unwrap();
    assert_eq!(redelivered.body.as_str(), Some("retry-me"));
    assert_eq!(redelivered.handled_count(), 1);
}

#[test]
fn acknowledge_twice_is_harmless() {
    let bus = InMemoryBus::new();
    let channel = channel(&bus, 1);
    bus.send(&text("x")).unwrap();
    let message = channel.receive(Duration::from_millis(10)).unwrap();

    channel.acknowledge(&message).unwrap();
    channel.acknowledge(&message).unwrap();
    assert_eq!(bus.acknowledged().len(), 1);
}
