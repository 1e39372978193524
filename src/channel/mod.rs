//! Consumption side: the channel contract shared by transports.
//!
//! A `Channel` wraps a `MessageConsumer` (the transport) with a small local
//! buffer. `receive` serves from the buffer first and only goes to the
//! transport when it is empty, fetching up to `buffer_size` messages at
//! once. When nothing arrives within the timeout, `receive` returns an
//! empty message (`MessageType::None`) instead of an error, so consumers
//! poll in a loop.
//!
//! ## Message lifecycle
//!
//! ```text
//! available ──receive──► delivered ──┬─ acknowledge ──► removed
//!                                    ├─ reject(false) ─► discarded / dead-lettered
//!                                    └─ reject(true) / requeue ──► available (handled_count + 1)
//! ```
//!
//! `stop` pushes a Quit sentinel in front of anything buffered. The consuming
//! loop sees it on its next `receive` and exits; buffered messages stay
//! where they are and are returned by later calls. When the channel is
//! dropped, whatever is still buffered goes back to the transport.

mod in_memory;
mod subscription;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

pub use in_memory::{InMemoryChannelFactory, InMemoryConsumer};
pub use subscription::Subscription;

use crate::error::{ChannelError, ConfigurationError};
use crate::message::Message;

/// Smallest buffer a channel accepts.
pub const MIN_BUFFER_SIZE: usize = 1;
/// Largest buffer a channel accepts.
pub const MAX_BUFFER_SIZE: usize = 10;

/// Transport-side consumer of one topic.
///
/// Implementations talk to the broker; `Channel` layers buffering and the
/// stop protocol on top.
pub trait MessageConsumer: Send + Sync {
    /// Fetch up to `max` messages, waiting up to `timeout` for the first.
    /// An empty vec means nothing arrived in time.
    fn receive(&self, timeout: Duration, max: usize) -> Result<Vec<Message>, ChannelError>;

    /// Permanently remove the message. Must be idempotent.
    fn acknowledge(&self, message: &Message) -> Result<(), ChannelError>;

    /// Requeue the message when `requeue` is true, otherwise discard it or
    /// move it to the transport's dead-letter store.
    fn reject(&self, message: &Message, requeue: bool) -> Result<(), ChannelError>;

    /// Make the message available again after `delay`.
    fn requeue(&self, message: &Message, delay: Duration) -> Result<(), ChannelError>;

    /// Drop everything waiting on the topic.
    fn purge(&self) -> Result<(), ChannelError>;
}

/// Creates one channel per performer.
pub trait ChannelFactory: Send + Sync {
    fn create_channel(&self, subscription: &Subscription) -> Result<Channel, ConfigurationError>;
}

/// A buffered, stoppable view of a consumer.
///
/// One performer owns each channel; `stop` may be called from any thread.
pub struct Channel {
    name: String,
    routing_key: String,
    consumer: Box<dyn MessageConsumer>,
    buffer: Mutex<VecDeque<Message>>,
    buffer_size: usize,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("routing_key", &self.routing_key)
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl Channel {
    /// Create a channel. `buffer_size` must be within
    /// `MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE`.
    pub fn new(
        name: impl Into<String>,
        routing_key: impl Into<String>,
        consumer: impl MessageConsumer + 'static,
        buffer_size: usize,
    ) -> Result<Self, ConfigurationError> {
        check_buffer_size(buffer_size)?;
        Ok(Self {
            name: name.into(),
            routing_key: routing_key.into(),
            consumer: Box::new(consumer),
            buffer: Mutex::new(VecDeque::with_capacity(buffer_size)),
            buffer_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn buffer(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Messages currently held locally, Quit sentinels excluded.
    pub fn buffered(&self) -> usize {
        self.buffer().iter().filter(|m| !m.is_quit()).count()
    }

    /// Add messages to the local buffer. Fails without adding anything if
    /// the buffer would exceed `buffer_size`.
    pub fn enqueue(&self, messages: Vec<Message>) -> Result<(), ChannelError> {
        let mut buffer = self.buffer();
        let held = buffer.iter().filter(|m| !m.is_quit()).count();
        let incoming = messages.iter().filter(|m| !m.is_quit()).count();
        if held + incoming > self.buffer_size {
            return Err(ChannelError::BufferOverflow {
                attempted: held + incoming,
                capacity: self.buffer_size,
            });
        }
        buffer.extend(messages);
        Ok(())
    }

    /// Next message: from the buffer if it has one, otherwise from the
    /// transport, waiting up to `timeout`. Returns an empty message when
    /// nothing arrives.
    pub fn receive(&self, timeout: Duration) -> Result<Message, ChannelError> {
        if let Some(message) = self.buffer().pop_front() {
            return Ok(message);
        }

        let fetched = self.consumer.receive(timeout, self.buffer_size)?;
        if fetched.is_empty() {
            return Ok(Message::empty());
        }
        debug!(channel = %self.name, count = fetched.len(), "fetched");
        self.enqueue(fetched)?;
        Ok(self.buffer().pop_front().unwrap_or_else(Message::empty))
    }

    pub fn acknowledge(&self, message: &Message) -> Result<(), ChannelError> {
        self.consumer.acknowledge(message)
    }

    /// Reject a message. With `requeue` the handled count is incremented
    /// and the message becomes available again.
    pub fn reject(&self, mut message: Message, requeue: bool) -> Result<(), ChannelError> {
        if requeue {
            message.increment_handled_count();
        }
        self.consumer.reject(&message, requeue)
    }

    /// Re-deliver a message after `delay`, incrementing its handled count.
    pub fn requeue(&self, mut message: Message, delay: Duration) -> Result<(), ChannelError> {
        message.increment_handled_count();
        self.consumer.requeue(&message, delay)
    }

    /// Ask the consuming loop to exit. The Quit sentinel goes ahead of any
    /// buffered message.
    pub fn stop(&self) {
        debug!(channel = %self.name, "stop requested");
        self.buffer().push_front(Message::quit(self.routing_key.clone()));
    }

    /// Drop buffered messages and everything waiting on the transport.
    /// A pending Quit survives the purge.
    pub fn purge(&self) -> Result<(), ChannelError> {
        self.buffer().retain(Message::is_quit);
        self.consumer.purge()
    }

    /// Hand buffered messages back to the transport without counting a
    /// handling attempt. A pending Quit stays buffered. Returns how many
    /// messages went back.
    pub fn release(&self) -> Result<usize, ChannelError> {
        let mut pending: VecDeque<Message> = {
            let mut buffer = self.buffer();
            let pending: VecDeque<Message> =
                buffer.iter().filter(|m| !m.is_quit()).cloned().collect();
            buffer.retain(Message::is_quit);
            pending
        };

        let mut released = 0;
        while let Some(message) = pending.pop_front() {
            if let Err(err) = self.consumer.requeue(&message, Duration::ZERO) {
                // keep what was not handed back so a later release can retry
                pending.push_front(message);
                self.buffer().extend(pending);
                return Err(err);
            }
            released += 1;
        }
        if released > 0 {
            debug!(channel = %self.name, released, "buffered messages released");
        }
        Ok(released)
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(
                channel = %self.name,
                %err,
                buffered = self.buffered(),
                "failed to release buffered messages"
            );
        }
    }
}

pub(crate) fn check_buffer_size(size: usize) -> Result<(), ConfigurationError> {
    if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&size) {
        return Err(ConfigurationError::BufferSize {
            size,
            min: MIN_BUFFER_SIZE,
            max: MAX_BUFFER_SIZE,
        });
    }
    Ok(())
}
