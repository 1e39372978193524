use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{OutboxRecord, OutboxStore};
use crate::error::OutboxError;

/// Destination for dispatched records before they are deleted.
pub trait ArchiveProvider: Send {
    fn archive(&mut self, records: &[OutboxRecord]) -> Result<(), OutboxError>;
}

/// Writes each record as one JSON line.
pub struct JsonLinesArchive<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesArchive<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ArchiveProvider for JsonLinesArchive<W> {
    fn archive(&mut self, records: &[OutboxRecord]) -> Result<(), OutboxError> {
        for record in records {
            let line =
                serde_json::to_string(record).map_err(|e| OutboxError::Archive(e.to_string()))?;
            writeln!(self.writer, "{line}").map_err(|e| OutboxError::Archive(e.to_string()))?;
        }
        self.writer.flush().map_err(|e| OutboxError::Archive(e.to_string()))
    }
}

/// Moves records dispatched longer ago than the retention period into an
/// archive, then deletes them from the outbox. Nothing is deleted unless the
/// archive call succeeded.
pub struct OutboxArchiver<A> {
    outbox: Arc<dyn OutboxStore>,
    provider: A,
    retention: Duration,
    batch_size: usize,
}

impl<A: ArchiveProvider> OutboxArchiver<A> {
    pub fn new(outbox: Arc<dyn OutboxStore>, provider: A) -> Self {
        Self {
            outbox,
            provider,
            retention: Duration::from_secs(24 * 60 * 60),
            batch_size: 100,
        }
    }

    /// Archive records dispatched at least this long ago.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn provider(&self) -> &A {
        &self.provider
    }

    pub fn into_provider(self) -> A {
        self.provider
    }

    /// Archive and delete one batch. Returns how many records were moved.
    pub fn archive(&mut self) -> Result<usize, OutboxError> {
        let records = self.outbox.dispatched_messages(self.retention, self.batch_size)?;
        if records.is_empty() {
            return Ok(0);
        }

        self.provider.archive(&records)?;

        let ids: Vec<String> = records.iter().map(|r| r.id().to_string()).collect();
        self.outbox.delete(&ids)?;
        info!(archived = ids.len(), "outbox records archived");
        Ok(ids.len())
    }
}
