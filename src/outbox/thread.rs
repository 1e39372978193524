//! Background threads that sweep and archive the outbox on an interval.

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{ArchiveProvider, OutboxArchiver, OutboxSweeper};

/// Statistics from a sweeper thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweeperStats {
    pub sweeps: usize,
    pub messages_dispatched: usize,
    pub messages_failed: usize,
    pub errors: usize,
}

/// Statistics from an archiver thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ArchiverStats {
    pub runs: usize,
    pub records_archived: usize,
    pub errors: usize,
}

/// Wait for the next tick. Returns false when the thread should exit.
fn wait_tick(stop_rx: &Receiver<()>, interval: Duration) -> bool {
    match stop_rx.recv_timeout(interval) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        Err(RecvTimeoutError::Timeout) => true,
    }
}

/// A background thread that runs an `OutboxSweeper` every `interval`.
///
/// ## Example
///
/// ```ignore
/// use relay_rust::outbox::{OutboxSweeper, TimedOutboxSweeper};
///
/// let sweeper = OutboxSweeper::new(outbox, producers).with_min_age(Duration::from_millis(500));
/// let worker = TimedOutboxSweeper::spawn(sweeper, Duration::from_millis(100));
///
/// // ... do work ...
///
/// let stats = worker.stop();
/// println!("dispatched {} messages", stats.messages_dispatched);
/// ```
pub struct TimedOutboxSweeper {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<SweeperStats>>,
}

impl TimedOutboxSweeper {
    /// Spawn the sweeper thread. The first sweep runs immediately.
    pub fn spawn(sweeper: OutboxSweeper, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = SweeperStats::default();
            loop {
                stats.sweeps += 1;
                match sweeper.sweep() {
                    Ok(result) => {
                        stats.messages_dispatched += result.dispatched.len();
                        stats.messages_failed += result.failed + result.no_producer;
                    }
                    Err(err) => {
                        // store errors are retried on the next tick
                        warn!(%err, "outbox sweep failed");
                        stats.errors += 1;
                    }
                }
                if !wait_tick(&stop_rx, interval) {
                    break;
                }
            }
            debug!(sweeps = stats.sweeps, "outbox sweeper stopped");
            stats
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the thread to stop and wait for it to finish.
    pub fn stop(mut self) -> SweeperStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => SweeperStats::default(),
        }
    }

    /// Signal the thread to stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for TimedOutboxSweeper {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// A background thread that runs an `OutboxArchiver` every `interval`.
///
/// Stopping returns the archiver, so the caller can get at its provider.
pub struct TimedOutboxArchiver<A> {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<(OutboxArchiver<A>, ArchiverStats)>>,
}

impl<A: ArchiveProvider + 'static> TimedOutboxArchiver<A> {
    pub fn spawn(mut archiver: OutboxArchiver<A>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = ArchiverStats::default();
            loop {
                stats.runs += 1;
                match archiver.archive() {
                    Ok(count) => stats.records_archived += count,
                    Err(err) => {
                        warn!(%err, "outbox archive failed");
                        stats.errors += 1;
                    }
                }
                if !wait_tick(&stop_rx, interval) {
                    break;
                }
            }
            (archiver, stats)
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the thread; returns the archiver and the statistics, or `None`
    /// if the thread panicked.
    pub fn stop(mut self) -> Option<(OutboxArchiver<A>, ArchiverStats)> {
        let _ = self.stop_tx.send(());
        self.handle.take().and_then(|handle| handle.join().ok())
    }

    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl<A> Drop for TimedOutboxArchiver<A> {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
