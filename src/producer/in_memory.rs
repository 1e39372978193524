//! In-memory transport for testing and single-process scenarios.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::Producer;
use crate::error::{ChannelError, ProducerError};
use crate::message::Message;

#[derive(Default)]
struct BusState {
    queues: HashMap<String, VecDeque<Message>>,
    delayed: Vec<(Instant, Message)>,
    sent: Vec<Message>,
    acknowledged: Vec<String>,
    dead_letters: Vec<Message>,
    unavailable: HashSet<String>,
}

impl BusState {
    /// Move delayed messages whose time has come onto their queues.
    /// Returns the earliest remaining due time.
    fn promote_due(&mut self, now: Instant) -> Option<Instant> {
        let mut next_due: Option<Instant> = None;
        let mut i = 0;
        while i < self.delayed.len() {
            if self.delayed[i].0 <= now {
                let (_, message) = self.delayed.remove(i);
                self.queues
                    .entry(message.topic().to_string())
                    .or_default()
                    .push_back(message);
            } else {
                let due = self.delayed[i].0;
                next_due = Some(next_due.map_or(due, |d| d.min(due)));
                i += 1;
            }
        }
        next_due
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<BusState>,
    available: Condvar,
}

/// Topic-keyed in-memory queues.
///
/// Features:
/// - Thread-safe; clones share the same queues
/// - Blocking receive with timeout
/// - Acknowledge, requeue (optionally delayed) and dead-letter bookkeeping
/// - A log of every message sent, for assertions
/// - Topics can be marked unavailable to simulate broker failures
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use relay_rust::message::{Message, MessageBody, MessageType};
/// use relay_rust::producer::{InMemoryBus, Producer};
///
/// let bus = InMemoryBus::new();
/// bus.send(&Message::create("orders", MessageType::Event, MessageBody::text("hi"))).unwrap();
///
/// let received = bus.receive("orders", Duration::from_millis(10), 10).unwrap();
/// assert_eq!(received.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    shared: Arc<Shared>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take up to `max` messages from `topic`, waiting up to `timeout` for
    /// the first one. Returns an empty vec when nothing arrived in time.
    pub fn receive(
        &self,
        topic: &str,
        timeout: Duration,
        max: usize,
    ) -> Result<Vec<Message>, ChannelError> {
        let deadline = Instant::now() + timeout;
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| ChannelError::LockPoisoned("receive"))?;

        loop {
            let now = Instant::now();
            let next_due = state.promote_due(now);

            if let Some(queue) = state.queues.get_mut(topic) {
                if !queue.is_empty() {
                    let take = max.min(queue.len());
                    return Ok(queue.drain(..take).collect());
                }
            }

            if now >= deadline {
                return Ok(Vec::new());
            }

            let wake_at = next_due.map_or(deadline, |due| due.min(deadline));
            let wait = wake_at.saturating_duration_since(now);
            let (guard, _) = self
                .shared
                .available
                .wait_timeout(state, wait)
                .map_err(|_| ChannelError::LockPoisoned("receive"))?;
            state = guard;
        }
    }

    /// Record a message as acknowledged. Repeated calls are ignored.
    pub fn acknowledge(&self, message: &Message) {
        let mut state = self.state();
        if !state.acknowledged.iter().any(|id| id == message.id()) {
            state.acknowledged.push(message.id().to_string());
        }
    }

    /// Make `message` available again on its topic, after `delay` if non-zero.
    pub fn requeue(&self, message: Message, delay: Duration) {
        let mut state = self.state();
        debug!(
            message_id = %message.id(),
            topic = %message.topic(),
            delay_ms = delay.as_millis() as u64,
            "requeued"
        );
        if delay.is_zero() {
            state
                .queues
                .entry(message.topic().to_string())
                .or_default()
                .push_back(message);
        } else {
            state.delayed.push((Instant::now() + delay, message));
        }
        drop(state);
        self.shared.available.notify_all();
    }

    pub fn dead_letter(&self, message: Message) {
        debug!(message_id = %message.id(), topic = %message.topic(), "dead-lettered");
        self.state().dead_letters.push(message);
    }

    /// Drop every queued and delayed message for `topic`.
    pub fn purge(&self, topic: &str) {
        let mut state = self.state();
        if let Some(queue) = state.queues.get_mut(topic) {
            queue.clear();
        }
        state.delayed.retain(|(_, m)| m.topic() != topic);
    }

    /// Make sends to `topic` fail until `restore_topic` is called.
    pub fn fail_topic(&self, topic: impl Into<String>) {
        self.state().unavailable.insert(topic.into());
    }

    pub fn restore_topic(&self, topic: &str) {
        self.state().unavailable.remove(topic);
    }

    /// Every message ever sent through this bus, in order.
    pub fn sent(&self) -> Vec<Message> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, topic: &str) -> Vec<Message> {
        self.state()
            .sent
            .iter()
            .filter(|m| m.topic() == topic)
            .cloned()
            .collect()
    }

    /// Messages waiting on `topic` (delayed ones excluded).
    pub fn pending(&self, topic: &str) -> usize {
        self.state().queues.get(topic).map_or(0, VecDeque::len)
    }

    pub fn delayed(&self) -> usize {
        self.state().delayed.len()
    }

    pub fn acknowledged(&self) -> Vec<String> {
        self.state().acknowledged.clone()
    }

    pub fn dead_letters(&self) -> Vec<Message> {
        self.state().dead_letters.clone()
    }

    /// Clear all queues and bookkeeping (useful for test cleanup).
    pub fn clear(&self) {
        *self.state() = BusState::default();
    }
}

impl Producer for InMemoryBus {
    fn send(&self, message: &Message) -> Result<(), ProducerError> {
        let mut state = self.shared.state.lock().map_err(|_| ProducerError::LockPoisoned)?;
        if state.unavailable.contains(message.topic()) {
            return Err(ProducerError::Unavailable {
                topic: message.topic().to_string(),
                reason: "topic marked unavailable".into(),
            });
        }
        state.sent.push(message.clone());
        state
            .queues
            .entry(message.topic().to_string())
            .or_default()
            .push_back(message.clone());
        drop(state);
        self.shared.available.notify_all();
        Ok(())
    }
}
