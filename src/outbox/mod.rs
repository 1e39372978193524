//! Transactional outbox.
//!
//! Messages produced as a side effect of a business transaction are first
//! deposited in an `OutboxStore`, inside the same transaction when the
//! caller has one. A sweep later reads outstanding records, sends each one
//! through the producer registered for its topic and marks it dispatched.
//! Dispatched records are archived and deleted after a retention period.
//!
//! ## Record lifecycle
//!
//! ```text
//! add ──► outstanding ──(sweep: send ok)──► dispatched ──(archive)──► deleted
//!              ▲               │
//!              └──(send failed)┘
//! ```
//!
//! Delivery is at-least-once: a record stays outstanding until a send
//! succeeds *and* `mark_dispatched` is stored, so a failed mark leads to a
//! duplicate send rather than a lost message. Downstream consumers
//! deduplicate by message id.
//!
//! ## Components
//!
//! - `OutboxStore` - the storage contract
//! - `InMemoryOutbox` / `InMemoryTransaction` - in-process store
//! - `OutboxSweeper` - one sweep over outstanding records
//! - `TopicCircuitBreaker` - trips topics that keep failing
//! - `TimedOutboxSweeper` / `TimedOutboxArchiver` - background threads
//! - `OutboxArchiver` / `ArchiveProvider` / `JsonLinesArchive` - archival

mod archive;
mod breaker;
mod in_memory;
mod sweeper;
mod thread;

use std::any::Any;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

pub use archive::{ArchiveProvider, JsonLinesArchive, OutboxArchiver};
pub use breaker::TopicCircuitBreaker;
pub use in_memory::{InMemoryOutbox, InMemoryTransaction};
pub use sweeper::{OutboxSweeper, SweepResult};
pub(crate) use sweeper::dispatch_ids;
pub use thread::{ArchiverStats, SweeperStats, TimedOutboxArchiver, TimedOutboxSweeper};

use crate::error::OutboxError;
use crate::message::Message;

/// A deposited message and its dispatch bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub message: Message,
    pub created_at: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<SystemTime>,
}

impl OutboxRecord {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            created_at: SystemTime::now(),
            dispatched_at: None,
        }
    }

    pub fn id(&self) -> &str {
        self.message.id()
    }

    pub fn topic(&self) -> &str {
        self.message.topic()
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched_at.is_some()
    }

    /// Whether the record was created at least `min_age` before `now`.
    pub fn older_than(&self, min_age: Duration, now: SystemTime) -> bool {
        age_at(self.created_at, now) >= min_age
    }

    /// Whether the record was dispatched at least `age` before `now`.
    pub fn dispatched_before(&self, age: Duration, now: SystemTime) -> bool {
        self.dispatched_at.is_some_and(|at| age_at(at, now) >= age)
    }
}

fn age_at(then: SystemTime, now: SystemTime) -> Duration {
    now.duration_since(then).unwrap_or(Duration::ZERO)
}

/// Storage contract for the outbox.
///
/// Implementations must be safe under concurrent calls from many
/// dispatching threads and the sweep. `mark_dispatched` in particular must
/// be an atomic set-once update.
pub trait OutboxStore: Send + Sync {
    /// Insert a record keyed by message id. Adding an id that already exists
    /// is a no-op. When `transaction` is given, the insert joins it and is
    /// discarded if the transaction rolls back.
    fn add(&self, message: Message, transaction: Option<&mut dyn Any>) -> Result<(), OutboxError>;

    fn get(&self, id: &str) -> Result<Option<OutboxRecord>, OutboxError>;

    /// Undispatched records created at least `min_age` ago whose topic is not
    /// in `tripped_topics`, oldest first, at most `limit`.
    fn outstanding_messages(
        &self,
        min_age: Duration,
        tripped_topics: &[String],
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, OutboxError>;

    /// Set the dispatch time (now when `None`). Once set it never changes;
    /// later calls for the same id are no-ops.
    fn mark_dispatched(
        &self,
        id: &str,
        dispatched_at: Option<SystemTime>,
    ) -> Result<(), OutboxError>;

    /// Records dispatched at least `age` ago, oldest dispatch first.
    fn dispatched_messages(
        &self,
        age: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, OutboxError>;

    /// Permanently remove records. Unknown ids are ignored.
    fn delete(&self, ids: &[String]) -> Result<(), OutboxError>;

    fn outstanding_count(&self) -> Result<usize, OutboxError>;
}
