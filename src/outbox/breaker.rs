use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

#[derive(Debug, Default)]
struct TopicState {
    consecutive_failures: u32,
    tripped_until: Option<Instant>,
}

/// Tracks send failures per topic and trips topics that keep failing.
///
/// A tripped topic is handed to `OutboxStore::outstanding_messages` as
/// excluded until its cooldown expires, so a sweep does not keep hammering
/// a broker that is down.
#[derive(Debug)]
pub struct TopicCircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    topics: Mutex<HashMap<String, TopicState>>,
}

impl Default for TopicCircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

impl TopicCircuitBreaker {
    /// Trip a topic after `threshold` consecutive failures, for `cooldown`.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed send. Returns true if this failure tripped the topic.
    pub fn record_failure(&self, topic: &str) -> bool {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let state = topics.entry(topic.to_string()).or_default();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.threshold && state.tripped_until.is_none() {
            state.tripped_until = Some(Instant::now() + self.cooldown);
            warn!(
                %topic,
                failures = state.consecutive_failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "topic tripped"
            );
            return true;
        }
        false
    }

    pub fn record_success(&self, topic: &str) {
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.remove(topic);
    }

    pub fn is_tripped(&self, topic: &str) -> bool {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics
            .get(topic)
            .and_then(|s| s.tripped_until)
            .is_some_and(|until| Instant::now() < until)
    }

    /// Topics currently tripped, sorted. Expired trips are reset, giving
    /// the topic a fresh failure budget.
    pub fn tripped_topics(&self) -> Vec<String> {
        let now = Instant::now();
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.retain(|_, state| !matches!(state.tripped_until, Some(until) if until <= now));
        let mut tripped: Vec<String> = topics
            .iter()
            .filter(|(_, state)| state.tripped_until.is_some())
            .map(|(topic, _)| topic.clone())
            .collect();
        tripped.sort_unstable();
        tripped
    }
}
