use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::{OutboxRecord, OutboxStore};
use crate::error::OutboxError;
use crate::message::Message;

struct Entry {
    seq: u64,
    record: OutboxRecord,
}

#[derive(Default)]
struct Records {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Records {
    /// Insert unless the id exists. Returns whether a record was added.
    fn insert_if_absent(&mut self, message: Message) -> bool {
        if self.entries.contains_key(message.id()) {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            message.id().to_string(),
            Entry {
                seq,
                record: OutboxRecord::new(message),
            },
        );
        true
    }
}

/// Thread-safe in-memory outbox store.
///
/// Clones share the same records. Every operation waits at most `timeout`
/// for the store lock and fails with `OutboxError::Timeout` after that.
///
/// Deposits can join an `InMemoryTransaction`; they become visible only when
/// it commits.
///
/// ```
/// use relay_rust::message::{Message, MessageBody, MessageType};
/// use relay_rust::outbox::{InMemoryOutbox, OutboxStore};
///
/// let outbox = InMemoryOutbox::new();
/// let mut tx = outbox.begin();
/// let message = Message::create("orders", MessageType::Event, MessageBody::text("placed"));
/// outbox.add(message, Some(&mut tx)).unwrap();
/// assert_eq!(outbox.outstanding_count().unwrap(), 0);
///
/// tx.commit().unwrap();
/// assert_eq!(outbox.outstanding_count().unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct InMemoryOutbox {
    records: Arc<RwLock<Records>>,
    timeout: Duration,
}

impl Default for InMemoryOutbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InMemoryOutbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryOutbox")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl InMemoryOutbox {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Records::default())),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Set how long an operation waits for the store lock.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a transaction whose deposits are applied on commit.
    pub fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction {
            outbox: self.clone(),
            staged: Vec::new(),
            on_commit: Vec::new(),
            closed: false,
        }
    }

    /// Total number of records, dispatched or not.
    pub fn len(&self) -> Result<usize, OutboxError> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, OutboxError> {
        Ok(self.len()? == 0)
    }

    fn same_store(&self, other: &InMemoryOutbox) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>, OutboxError> {
        self.records
            .try_read_for(self.timeout)
            .ok_or(OutboxError::Timeout(self.timeout))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>, OutboxError> {
        self.records
            .try_write_for(self.timeout)
            .ok_or(OutboxError::Timeout(self.timeout))
    }
}

impl OutboxStore for InMemoryOutbox {
    fn add(&self, message: Message, transaction: Option<&mut dyn Any>) -> Result<(), OutboxError> {
        if let Some(transaction) = transaction {
            let tx = transaction
                .downcast_mut::<InMemoryTransaction>()
                .ok_or(OutboxError::UnsupportedTransaction)?;
            if !self.same_store(&tx.outbox) {
                return Err(OutboxError::UnsupportedTransaction);
            }
            return tx.stage(message);
        }

        let id = message.id().to_string();
        if self.write()?.insert_if_absent(message) {
            debug!(message_id = %id, "deposited in outbox");
        } else {
            debug!(message_id = %id, "already in outbox, ignored");
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<OutboxRecord>, OutboxError> {
        Ok(self.read()?.entries.get(id).map(|e| e.record.clone()))
    }

    fn outstanding_messages(
        &self,
        min_age: Duration,
        tripped_topics: &[String],
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, OutboxError> {
        let now = SystemTime::now();
        let records = self.read()?;
        let mut outstanding: Vec<&Entry> = records
            .entries
            .values()
            .filter(|e| !e.record.is_dispatched())
            .filter(|e| e.record.older_than(min_age, now))
            .filter(|e| !tripped_topics.iter().any(|t| t == e.record.topic()))
            .collect();
        outstanding.sort_by_key(|e| (e.record.created_at, e.seq));
        Ok(outstanding
            .into_iter()
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }

    fn mark_dispatched(
        &self,
        id: &str,
        dispatched_at: Option<SystemTime>,
    ) -> Result<(), OutboxError> {
        let mut records = self.write()?;
        if let Some(entry) = records.entries.get_mut(id) {
            if entry.record.dispatched_at.is_none() {
                entry.record.dispatched_at = Some(dispatched_at.unwrap_or_else(SystemTime::now));
            }
        }
        Ok(())
    }

    fn dispatched_messages(
        &self,
        age: Duration,
        limit: usize,
    ) -> Result<Vec<OutboxRecord>, OutboxError> {
        let now = SystemTime::now();
        let records = self.read()?;
        let mut dispatched: Vec<&Entry> = records
            .entries
            .values()
            .filter(|e| e.record.dispatched_before(age, now))
            .collect();
        dispatched.sort_by_key(|e| (e.record.dispatched_at, e.seq));
        Ok(dispatched
            .into_iter()
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }

    fn delete(&self, ids: &[String]) -> Result<(), OutboxError> {
        let mut records = self.write()?;
        for id in ids {
            records.entries.remove(id);
        }
        Ok(())
    }

    fn outstanding_count(&self) -> Result<usize, OutboxError> {
        Ok(self
            .read()?
            .entries
            .values()
            .filter(|e| !e.record.is_dispatched())
            .count())
    }
}

type CommitAction = Box<dyn FnOnce() + Send>;

/// A unit of work spanning business writes and outbox deposits.
///
/// Deposits made with `OutboxStore::add(message, Some(&mut tx))` are staged
/// and applied atomically by `commit`. `rollback`, or dropping the
/// transaction without committing, discards them together with any
/// registered business writes.
pub struct InMemoryTransaction {
    outbox: InMemoryOutbox,
    staged: Vec<Message>,
    on_commit: Vec<CommitAction>,
    closed: bool,
}

impl fmt::Debug for InMemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTransaction")
            .field("staged", &self.staged.len())
            .field("on_commit", &self.on_commit.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl InMemoryTransaction {
    fn stage(&mut self, message: Message) -> Result<(), OutboxError> {
        if self.closed {
            return Err(OutboxError::TransactionClosed);
        }
        self.staged.push(message);
        Ok(())
    }

    /// Register a business write applied when the transaction commits.
    /// Actions run while the outbox is locked and must not call back into it.
    pub fn on_commit(&mut self, action: impl FnOnce() + Send + 'static) -> Result<(), OutboxError> {
        if self.closed {
            return Err(OutboxError::TransactionClosed);
        }
        self.on_commit.push(Box::new(action));
        Ok(())
    }

    /// Messages staged so far.
    pub fn staged(&self) -> &[Message] {
        &self.staged
    }

    /// Apply business writes and deposits. Returns the number of records
    /// added (duplicates of existing ids are not counted).
    pub fn commit(mut self) -> Result<usize, OutboxError> {
        let mut records = self.outbox.write()?;
        for action in self.on_commit.drain(..) {
            action();
        }
        let mut added = 0;
        for message in self.staged.drain(..) {
            if records.insert_if_absent(message) {
                added += 1;
            }
        }
        drop(records);
        self.closed = true;
        debug!(added, "outbox transaction committed");
        Ok(added)
    }

    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !self.staged.is_empty() {
            debug!(discarded = self.staged.len(), "outbox transaction rolled back");
        }
        self.staged.clear();
        self.on_commit.clear();
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        self.discard();
    }
}
