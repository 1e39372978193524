//! Wire messages: `{ id, header, body }`.
//!
//! A `Message` is what crosses a transport. Requests become messages through
//! a `MessageMapper`; the outbox stores messages; channels hand messages to
//! the message pump.

mod body;
mod header;

pub use body::MessageBody;
pub use header::{MessageHeader, MessageType};

use serde::{Deserialize, Serialize};

use crate::request::new_id;

/// A message as it travels through the outbox and transports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl Message {
    pub fn new(header: MessageHeader, body: MessageBody) -> Self {
        let mut header = header;
        header.content_type = body.content_type.clone();
        Self { header, body }
    }

    /// A message with a fresh id.
    pub fn create(topic: impl Into<String>, message_type: MessageType, body: MessageBody) -> Self {
        Self::new(MessageHeader::new(new_id(), topic, message_type), body)
    }

    /// The distinguished "nothing received" message.
    pub fn empty() -> Self {
        Self {
            header: MessageHeader::default(),
            body: MessageBody::default(),
        }
    }

    /// The reserved sentinel telling a consuming loop to exit.
    pub fn quit(topic: impl Into<String>) -> Self {
        Self {
            header: MessageHeader::new(new_id(), topic, MessageType::Quit),
            body: MessageBody::default(),
        }
    }

    /// A message wrapping bytes the transport could not parse.
    pub fn unacceptable(topic: impl Into<String>, raw: Vec<u8>) -> Self {
        Self {
            header: MessageHeader::new(new_id(), topic, MessageType::Unacceptable),
            body: MessageBody::new(raw, MessageBody::TEXT),
        }
    }

    pub fn id(&self) -> &str {
        &self.header.message_id
    }

    pub fn topic(&self) -> &str {
        &self.header.topic
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type
    }

    pub fn is_empty(&self) -> bool {
        self.header.message_type == MessageType::None
    }

    pub fn is_quit(&self) -> bool {
        self.header.message_type == MessageType::Quit
    }

    pub fn handled_count(&self) -> u32 {
        self.header.handled_count
    }

    /// Record another handling attempt; used on requeue.
    pub fn increment_handled_count(&mut self) {
        self.header.handled_count = self.header.handled_count.saturating_add(1);
    }

    /// Whether this message has been handled at least `limit` times.
    pub fn handled_count_reached(&self, limit: u32) -> bool {
        self.header.handled_count >= limit
    }
}
