use std::time::Duration;

use super::{Channel, ChannelFactory, MessageConsumer, Subscription};
use crate::error::{ChannelError, ConfigurationError};
use crate::message::Message;
use crate::producer::InMemoryBus;

/// `MessageConsumer` over one topic of an `InMemoryBus`.
///
/// Rejected messages that are not requeued go to the bus's dead-letter list.
#[derive(Clone)]
pub struct InMemoryConsumer {
    bus: InMemoryBus,
    topic: String,
}

impl InMemoryConsumer {
    pub fn new(bus: InMemoryBus, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl MessageConsumer for InMemoryConsumer {
    fn receive(&self, timeout: Duration, max: usize) -> Result<Vec<Message>, ChannelError> {
        self.bus.receive(&self.topic, timeout, max)
    }

    fn acknowledge(&self, message: &Message) -> Result<(), ChannelError> {
        self.bus.acknowledge(message);
        Ok(())
    }

    fn reject(&self, message: &Message, requeue: bool) -> Result<(), ChannelError> {
        if requeue {
            self.bus.requeue(message.clone(), Duration::ZERO);
        } else {
            self.bus.dead_letter(message.clone());
        }
        Ok(())
    }

    fn requeue(&self, message: &Message, delay: Duration) -> Result<(), ChannelError> {
        self.bus.requeue(message.clone(), delay);
        Ok(())
    }

    fn purge(&self) -> Result<(), ChannelError> {
        self.bus.purge(&self.topic);
        Ok(())
    }
}

/// Creates channels that consume `subscription.routing_key` from a shared bus.
#[derive(Clone, Default)]
pub struct InMemoryChannelFactory {
    bus: InMemoryBus,
}

impl InMemoryChannelFactory {
    pub fn new(bus: InMemoryBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &InMemoryBus {
        &self.bus
    }
}

impl ChannelFactory for InMemoryChannelFactory {
    fn create_channel(&self, subscription: &Subscription) -> Result<Channel, ConfigurationError> {
        Channel::new(
            subscription.channel_name.clone(),
            subscription.routing_key.clone(),
            InMemoryConsumer::new(self.bus.clone(), subscription.routing_key.clone()),
            subscription.buffer_size,
        )
    }
}
