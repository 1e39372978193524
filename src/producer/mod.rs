//! Producers send wire messages to a transport.
//!
//! The outbox sweep looks up a `Producer` by message topic in the
//! `ProducerRegistry`. Concrete broker clients live outside this crate; the
//! crate ships an in-memory bus for tests and single-process use, and a
//! producer that forwards to an in-process `EventEmitter`.
//!
//! ```text
//!  CommandProcessor::post ──► Outbox ──► OutboxSweeper ──► ProducerRegistry
//!                                                              │ topic
//!                                                              ▼
//!                                         ┌──────────────┬───────────────────┐
//!                                         │ InMemoryBus  │ LocalEmitter      │
//!                                         │ (included)   │ Producer (emitter)│
//!                                         └──────────────┴───────────────────┘
//! ```

#[cfg(feature = "emitter")]
mod emitter;
mod in_memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "emitter")]
pub use emitter::LocalEmitterProducer;
pub use in_memory::InMemoryBus;

use crate::error::{ConfigurationError, ProducerError};
use crate::message::Message;

/// Sends messages to a broker.
pub trait Producer: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), ProducerError>;
}

impl<P: Producer + ?Sized> Producer for Arc<P> {
    fn send(&self, message: &Message) -> Result<(), ProducerError> {
        (**self).send(message)
    }
}

/// Producers by topic.
#[derive(Clone, Default)]
pub struct ProducerRegistry {
    producers: HashMap<String, Arc<dyn Producer>>,
}

impl fmt::Debug for ProducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        topic: impl Into<String>,
        producer: impl Producer + 'static,
    ) -> &mut Self {
        self.producers.insert(topic.into(), Arc::new(producer));
        self
    }

    pub fn with(mut self, topic: impl Into<String>, producer: impl Producer + 'static) -> Self {
        self.add(topic, producer);
        self
    }

    pub fn lookup(&self, topic: &str) -> Result<Arc<dyn Producer>, ConfigurationError> {
        self.producers
            .get(topic)
            .cloned()
            .ok_or_else(|| ConfigurationError::NoProducer {
                topic: topic.to_string(),
            })
    }

    /// Registered topics, sorted.
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.producers.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
