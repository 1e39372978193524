use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{OutboxRecord, OutboxStore, TopicCircuitBreaker};
use crate::error::OutboxError;
use crate::producer::ProducerRegistry;

/// Result of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// Records read from the outbox.
    pub examined: usize,
    /// Ids sent and marked dispatched.
    pub dispatched: Vec<String>,
    /// Sends that failed; the records stay outstanding.
    pub failed: usize,
    /// Records whose topic has no producer.
    pub no_producer: usize,
    /// Sent, but storing the dispatch mark failed; they will be resent.
    pub mark_failed: usize,
    /// Skipped because their topic tripped during this sweep.
    pub skipped: usize,
    /// Topics tripped by failures in this sweep.
    pub tripped: Vec<String>,
}

impl SweepResult {
    pub fn did_work(&self) -> bool {
        self.examined > 0
    }
}

/// Sends outstanding outbox records through their topic's producer.
///
/// A sweep only uses the `OutboxStore` contract: read outstanding records
/// (skipping young records and tripped topics), send each one, mark it
/// dispatched on success. Failed records stay outstanding and are retried by
/// the next sweep.
pub struct OutboxSweeper {
    outbox: Arc<dyn OutboxStore>,
    producers: ProducerRegistry,
    min_age: Duration,
    batch_size: usize,
    breaker: Option<TopicCircuitBreaker>,
}

impl OutboxSweeper {
    pub fn new(outbox: Arc<dyn OutboxStore>, producers: ProducerRegistry) -> Self {
        Self {
            outbox,
            producers,
            min_age: Duration::from_millis(5000),
            batch_size: 100,
            breaker: None,
        }
    }

    /// Skip records younger than this, to avoid racing an in-flight commit.
    pub fn with_min_age(mut self, min_age: Duration) -> Self {
        self.min_age = min_age;
        self
    }

    /// Maximum records per sweep.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Exclude topics that keep failing.
    pub fn with_breaker(mut self, breaker: TopicCircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn breaker(&self) -> Option<&TopicCircuitBreaker> {
        self.breaker.as_ref()
    }

    pub fn outbox(&self) -> &Arc<dyn OutboxStore> {
        &self.outbox
    }

    pub fn sweep(&self) -> Result<SweepResult, OutboxError> {
        let tripped = self
            .breaker
            .as_ref()
            .map(TopicCircuitBreaker::tripped_topics)
            .unwrap_or_default();

        let records = self
            .outbox
            .outstanding_messages(self.min_age, &tripped, self.batch_size)?;

        let mut result = SweepResult::default();
        for record in &records {
            dispatch_record(
                self.outbox.as_ref(),
                &self.producers,
                self.breaker.as_ref(),
                record,
                &mut result,
            );
        }
        if result.did_work() {
            debug!(
                examined = result.examined,
                dispatched = result.dispatched.len(),
                failed = result.failed,
                "outbox sweep finished"
            );
        }
        Ok(result)
    }
}

/// Send `ids` now, skipping unknown and already dispatched ones.
pub(crate) fn dispatch_ids(
    outbox: &dyn OutboxStore,
    producers: &ProducerRegistry,
    ids: &[String],
) -> Result<SweepResult, OutboxError> {
    let mut result = SweepResult::default();
    for id in ids {
        match outbox.get(id)? {
            Some(record) if !record.is_dispatched() => {
                dispatch_record(outbox, producers, None, &record, &mut result);
            }
            Some(_) => debug!(message_id = %id, "already dispatched"),
            None => warn!(message_id = %id, "not in outbox"),
        }
    }
    Ok(result)
}

fn dispatch_record(
    outbox: &dyn OutboxStore,
    producers: &ProducerRegistry,
    breaker: Option<&TopicCircuitBreaker>,
    record: &OutboxRecord,
    result: &mut SweepResult,
) {
    result.examined += 1;
    let topic = record.topic();

    if breaker.is_some_and(|b| b.is_tripped(topic)) {
        result.skipped += 1;
        return;
    }

    let producer = match producers.lookup(topic) {
        Ok(producer) => producer,
        Err(err) => {
            error!(message_id = %record.id(), %topic, %err, "cannot dispatch");
            result.no_producer += 1;
            return;
        }
    };

    if let Err(err) = producer.send(&record.message) {
        warn!(message_id = %record.id(), %topic, %err, "send failed, message stays outstanding");
        result.failed += 1;
        if let Some(breaker) = breaker {
            if breaker.record_failure(topic) {
                result.tripped.push(topic.to_string());
            }
        }
        return;
    }

    if let Some(breaker) = breaker {
        breaker.record_success(topic);
    }

    match outbox.mark_dispatched(record.id(), None) {
        Ok(()) => {
            info!(message_id = %record.id(), %topic, "dispatched");
            result.dispatched.push(record.id().to_string());
        }
        Err(err) => {
            warn!(
                message_id = %record.id(),
                %topic,
                %err,
                "sent but not marked dispatched, will be resent"
            );
            result.mark_failed += 1;
        }
    }
}
