//! Message pumps: the inbound loop that turns channel messages into
//! dispatches.
//!
//! A `MessagePump<R>` repeatedly calls `Channel::receive`, maps each message
//! to an `R`, hands it to the `CommandProcessor` (`send` for commands,
//! `publish` for events) and settles the message based on the outcome:
//!
//! | outcome | action |
//! |---|---|
//! | empty message (`MT_NONE`) | sleep `empty_channel_delay`, poll again |
//! | Quit sentinel | exit |
//! | `MT_UNACCEPTABLE` or mapping failure | acknowledge, count toward the unacceptable limit |
//! | dispatched | acknowledge |
//! | `HandlerError::Defer` | requeue, or dead-letter once `requeue_count` attempts were made |
//! | configuration error | reject and exit |
//! | any other error | log and acknowledge |
//! | channel error | sleep `channel_failure_delay`, poll again |
//!
//! The `Dispatcher` runs one pump per performer thread.

mod dispatcher;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

pub use dispatcher::{Dispatcher, Performer};

use crate::channel::{Channel, Subscription};
use crate::error::{ConfigurationError, DispatchError};
use crate::mapper::MessageMapper;
use crate::message::{Message, MessageType};
use crate::processor::CommandProcessor;
use crate::request::{Command, Event, Request};

/// Counters from one pump run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    /// Messages taken off the channel, sentinels excluded.
    pub received: usize,
    /// Messages dispatched without error.
    pub handled: usize,
    pub acknowledged: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
    pub unacceptable: usize,
    /// Dispatches that failed with a non-deferring handler error.
    pub failed: usize,
    pub channel_failures: usize,
    pub exit: PumpExit,
}

/// Why a pump stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The channel was stopped.
    #[default]
    Quit,
    /// Too many unacceptable messages.
    UnacceptableLimit,
    /// A dispatch failed with a configuration error.
    Configuration,
}

/// Something a performer can run against its channel.
pub trait Pump: Send {
    fn run(&mut self, channel: &Channel) -> PumpStats;
}

type DispatchFn<R> = fn(&CommandProcessor, &R) -> Result<(), DispatchError>;

/// Pump for one request type.
pub struct MessagePump<R: Request> {
    processor: Arc<CommandProcessor>,
    mapper: Arc<dyn MessageMapper<R>>,
    dispatch: DispatchFn<R>,
    timeout: Duration,
    requeue_count: Option<u32>,
    requeue_delay: Duration,
    unacceptable_message_limit: u32,
    empty_channel_delay: Duration,
    channel_failure_delay: Duration,
}

impl<R: Request> Clone for MessagePump<R> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
            mapper: Arc::clone(&self.mapper),
            dispatch: self.dispatch,
            timeout: self.timeout,
            requeue_count: self.requeue_count,
            requeue_delay: self.requeue_delay,
            unacceptable_message_limit: self.unacceptable_message_limit,
            empty_channel_delay: self.empty_channel_delay,
            channel_failure_delay: self.channel_failure_delay,
        }
    }
}

impl<C: Command> MessagePump<C> {
    /// Pump that `send`s each message. The processor must have a mapper for `C`.
    pub fn command(
        processor: Arc<CommandProcessor>,
        subscription: &Subscription,
    ) -> Result<Self, ConfigurationError> {
        Self::with_dispatch(processor, subscription, |processor, command| {
            processor.send(command)
        })
    }
}

impl<E: Event> MessagePump<E> {
    /// Pump that `publish`es each message. The processor must have a mapper for `E`.
    pub fn event(
        processor: Arc<CommandProcessor>,
        subscription: &Subscription,
    ) -> Result<Self, ConfigurationError> {
        Self::with_dispatch(processor, subscription, |processor, event| {
            processor.publish(event)
        })
    }
}

impl<R: Request> MessagePump<R> {
    fn with_dispatch(
        processor: Arc<CommandProcessor>,
        subscription: &Subscription,
        dispatch: DispatchFn<R>,
    ) -> Result<Self, ConfigurationError> {
        subscription.validate()?;
        let mapper = processor.mappers().mapper::<R>()?;
        Ok(Self {
            processor,
            mapper,
            dispatch,
            timeout: subscription.timeout(),
            requeue_count: subscription.requeue_count,
            requeue_delay: subscription.requeue_delay(),
            unacceptable_message_limit: subscription.unacceptable_message_limit,
            empty_channel_delay: subscription.empty_channel_delay(),
            channel_failure_delay: subscription.channel_failure_delay(),
        })
    }

    /// Consume `channel` until it is stopped or a fatal condition occurs.
    pub fn run(&self, channel: &Channel) -> PumpStats {
        let mut stats = PumpStats::default();

        loop {
            let message = match channel.receive(self.timeout) {
                Ok(message) => message,
                Err(err) => {
                    warn!(channel = %channel.name(), %err, "channel failure, pausing pump");
                    stats.channel_failures += 1;
                    thread::sleep(self.channel_failure_delay);
                    continue;
                }
            };

            match message.message_type() {
                MessageType::None => {
                    thread::sleep(self.empty_channel_delay);
                    continue;
                }
                MessageType::Quit => {
                    debug!(channel = %channel.name(), "quit received");
                    stats.exit = PumpExit::Quit;
                    break;
                }
                MessageType::Unacceptable => {
                    stats.received += 1;
                    if self.unacceptable(channel, message, &mut stats) {
                        break;
                    }
                    continue;
                }
                _ => stats.received += 1,
            }

            debug!(channel = %channel.name(), message_id = %message.id(), "received");
            let request = match self.mapper.to_request(&message) {
                Ok(request) => request,
                Err(err) => {
                    warn!(
                        channel = %channel.name(),
                        message_id = %message.id(),
                        %err,
                        "failed to map message"
                    );
                    if self.unacceptable(channel, message, &mut stats) {
                        break;
                    }
                    continue;
                }
            };

            match (self.dispatch)(&self.processor, &request) {
                Ok(()) => {
                    stats.handled += 1;
                    self.acknowledge(channel, &message, &mut stats);
                }
                Err(err) if err.is_deferred() => self.requeue(channel, message, &mut stats),
                Err(err) if err.is_configuration() => {
                    error!(
                        channel = %channel.name(),
                        message_id = %message.id(),
                        %err,
                        "configuration error, stopping pump"
                    );
                    if let Err(err) = channel.reject(message, false) {
                        warn!(channel = %channel.name(), %err, "reject failed");
                    }
                    stats.dead_lettered += 1;
                    stats.exit = PumpExit::Configuration;
                    break;
                }
                Err(err) => {
                    warn!(
                        channel = %channel.name(),
                        message_id = %message.id(),
                        %err,
                        "dispatch failed"
                    );
                    stats.failed += 1;
                    self.acknowledge(channel, &message, &mut stats);
                }
            }
        }

        debug!(channel = %channel.name(), received = stats.received, "pump stopped");
        stats
    }

    fn acknowledge(&self, channel: &Channel, message: &Message, stats: &mut PumpStats) {
        match channel.acknowledge(message) {
            Ok(()) => stats.acknowledged += 1,
            Err(err) => warn!(
                channel = %channel.name(),
                message_id = %message.id(),
                %err,
                "acknowledge failed"
            ),
        }
    }

    /// Requeue a deferred message unless it has used up its attempts.
    /// The current attempt counts, so `requeue_count = 3` means the
    /// handler sees the message at most three times.
    fn requeue(&self, channel: &Channel, message: Message, stats: &mut PumpStats) {
        let exhausted = self
            .requeue_count
            .is_some_and(|limit| message.handled_count_reached(limit.saturating_sub(1)));

        if exhausted {
            error!(
                channel = %channel.name(),
                message_id = %message.id(),
                requeue_count = self.requeue_count,
                "requeue limit reached, dead-lettering message"
            );
            match channel.reject(message, false) {
                Ok(()) => stats.dead_lettered += 1,
                Err(err) => warn!(channel = %channel.name(), %err, "reject failed"),
            }
            return;
        }

        debug!(
            channel = %channel.name(),
            message_id = %message.id(),
            "requeueing deferred message"
        );
        match channel.requeue(message, self.requeue_delay) {
            Ok(()) => stats.requeued += 1,
            Err(err) => warn!(channel = %channel.name(), %err, "requeue failed"),
        }
    }

    /// Acknowledge an unacceptable message. Returns true when the pump
    /// should stop.
    fn unacceptable(&self, channel: &Channel, message: Message, stats: &mut PumpStats) -> bool {
        stats.unacceptable += 1;
        self.acknowledge(channel, &message, stats);

        let limit = self.unacceptable_message_limit;
        if limit > 0 && stats.unacceptable >= limit as usize {
            error!(
                channel = %channel.name(),
                limit,
                "unacceptable message limit reached, stopping pump"
            );
            stats.exit = PumpExit::UnacceptableLimit;
            return true;
        }
        false
    }
}

impl<R: Request> Pump for MessagePump<R> {
    fn run(&mut self, channel: &Channel) -> PumpStats {
        MessagePump::run(self, channel)
    }
}
