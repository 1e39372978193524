use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::check_buffer_size;
use crate::error::ConfigurationError;

/// How a topic is consumed: which channel, how many performers, and how
/// failures are redelivered.
///
/// Loadable from JSON; omitted fields take their defaults.
///
/// ```
/// use relay_rust::channel::Subscription;
///
/// let subscription = Subscription::from_json(
///     r#"{ "name": "orders", "channel_name": "orders-q", "routing_key": "orders", "buffer_size": 5 }"#,
/// ).unwrap();
/// assert_eq!(subscription.no_of_performers, 1);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub name: String,
    pub channel_name: String,
    pub routing_key: String,
    pub buffer_size: usize,
    pub no_of_performers: usize,
    pub timeout_ms: u64,
    /// Handled attempts after which a deferred message is dead-lettered.
    /// `None` requeues forever.
    pub requeue_count: Option<u32>,
    pub requeue_delay_ms: u64,
    /// Unacceptable messages a performer tolerates before stopping.
    /// Zero disables the limit.
    pub unacceptable_message_limit: u32,
    pub empty_channel_delay_ms: u64,
    pub channel_failure_delay_ms: u64,
}

impl Default for Subscription {
    fn default() -> Self {
        Self {
            name: String::new(),
            channel_name: String::new(),
            routing_key: String::new(),
            buffer_size: 1,
            no_of_performers: 1,
            timeout_ms: 300,
            requeue_count: None,
            requeue_delay_ms: 0,
            unacceptable_message_limit: 0,
            empty_channel_delay_ms: 50,
            channel_failure_delay_ms: 1000,
        }
    }
}

impl Subscription {
    pub fn new(
        name: impl Into<String>,
        channel_name: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            channel_name: channel_name.into(),
            routing_key: routing_key.into(),
            ..Self::default()
        }
    }

    /// Parse and validate a subscription.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let subscription: Self = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidSubscription(e.to_string()))?;
        subscription.validate()?;
        Ok(subscription)
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_performers(mut self, count: usize) -> Self {
        self.no_of_performers = count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_requeue(mut self, count: Option<u32>, delay: Duration) -> Self {
        self.requeue_count = count;
        self.requeue_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_unacceptable_message_limit(mut self, limit: u32) -> Self {
        self.unacceptable_message_limit = limit;
        self
    }

    pub fn with_empty_channel_delay(mut self, delay: Duration) -> Self {
        self.empty_channel_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_channel_failure_delay(mut self, delay: Duration) -> Self {
        self.channel_failure_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }

    pub fn empty_channel_delay(&self) -> Duration {
        Duration::from_millis(self.empty_channel_delay_ms)
    }

    pub fn channel_failure_delay(&self) -> Duration {
        Duration::from_millis(self.channel_failure_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::InvalidSubscription("name is required".into()));
        }
        if self.routing_key.is_empty() {
            return Err(ConfigurationError::InvalidSubscription(format!(
                "subscription {} has no routing key",
                self.name
            )));
        }
        if self.no_of_performers == 0 {
            return Err(ConfigurationError::InvalidSubscription(format!(
                "subscription {} needs at least one performer",
                self.name
            )));
        }
        check_buffer_size(self.buffer_size)
    }
}
