use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// What a message carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Returned by a receive that timed out with nothing to deliver.
    #[default]
    None,
    Command,
    Event,
    Document,
    /// Reserved sentinel that tells a consuming loop to exit.
    Quit,
    /// The transport received bytes it could not turn into a message.
    Unacceptable,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::None => "MT_NONE",
            MessageType::Command => "MT_COMMAND",
            MessageType::Event => "MT_EVENT",
            MessageType::Document => "MT_DOCUMENT",
            MessageType::Quit => "MT_QUIT",
            MessageType::Unacceptable => "MT_UNACCEPTABLE",
        }
    }
}

/// Routing and bookkeeping data for a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub message_id: String,
    pub topic: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    /// How many times a consumer has requeued this message.
    #[serde(default)]
    pub handled_count: u32,
    pub timestamp: SystemTime,
    /// Extensible key/value bag (trace context, original message id, ...).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub bag: HashMap<String, String>,
}

impl MessageHeader {
    pub const DEFAULT_CONTENT_TYPE: &'static str = "text/plain";

    pub fn new(
        message_id: impl Into<String>,
        topic: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            topic: topic.into(),
            message_type,
            correlation_id: None,
            reply_to: None,
            content_type: Self::DEFAULT_CONTENT_TYPE.to_string(),
            partition_key: None,
            handled_count: 0,
            timestamp: SystemTime::now(),
            bag: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_bag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bag.insert(key.into(), value.into());
        self
    }

    pub fn bag_value(&self, key: &str) -> Option<&str> {
        self.bag.get(key).map(|s| s.as_str())
    }
}

impl Default for MessageHeader {
    fn default() -> Self {
        Self::new(String::new(), String::new(), MessageType::None)
    }
}
