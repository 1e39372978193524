use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::{MessagePump, Pump, PumpStats};
use crate::channel::{Channel, ChannelFactory, Subscription};
use crate::error::ConfigurationError;
use crate::processor::CommandProcessor;
use crate::request::{Command, Event};

type PumpFactory = Box<dyn Fn() -> Box<dyn Pump> + Send + Sync>;

struct Connection {
    subscription: Subscription,
    pump: PumpFactory,
}

/// One worker thread consuming its own channel.
pub struct Performer {
    name: String,
    channel: Arc<Channel>,
    handle: Option<JoinHandle<PumpStats>>,
}

impl Performer {
    fn spawn(name: String, channel: Channel, mut pump: Box<dyn Pump>) -> Self {
        let channel = Arc::new(channel);
        let consumed = Arc::clone(&channel);
        let handle = thread::spawn(move || pump.run(&consumed));
        Self {
            name,
            channel,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the pump to exit after the message it is working on.
    pub fn stop(&self) {
        self.channel.stop();
    }

    /// Wait for the pump to exit.
    pub fn join(mut self) -> PumpStats {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!(performer = %self.name, "performer panicked");
                PumpStats::default()
            }
            None => PumpStats::default(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for Performer {
    fn drop(&mut self) {
        self.channel.stop();
    }
}

/// Runs message pumps for a set of subscriptions.
///
/// Each subscription gets `no_of_performers` threads, and each thread gets
/// its own channel from the `ChannelFactory`, so buffers are never shared.
///
/// ```ignore
/// let factory = InMemoryChannelFactory::new(bus.clone());
/// let orders = Subscription::new("orders", "orders-q", "orders").with_performers(2);
/// let mut dispatcher = Dispatcher::new(Arc::clone(&processor), factory)
///     .with_command::<CreateOrder>(orders)?;
/// dispatcher.receive()?;
/// // ...
/// for (performer, stats) in dispatcher.end() {
///     println!("{performer}: {} handled", stats.handled);
/// }
/// ```
pub struct Dispatcher {
    processor: Arc<CommandProcessor>,
    channels: Box<dyn ChannelFactory>,
    connections: Vec<Connection>,
    performers: Vec<Performer>,
}

impl Dispatcher {
    pub fn new(processor: Arc<CommandProcessor>, channels: impl ChannelFactory + 'static) -> Self {
        Self {
            processor,
            channels: Box::new(channels),
            connections: Vec::new(),
            performers: Vec::new(),
        }
    }

    /// Consume `subscription` as commands of type `C`.
    pub fn with_command<C: Command>(
        mut self,
        subscription: Subscription,
    ) -> Result<Self, ConfigurationError> {
        let pump = MessagePump::<C>::command(Arc::clone(&self.processor), &subscription)?;
        self.connections.push(Connection {
            subscription,
            pump: Box::new(move || Box::new(pump.clone()) as Box<dyn Pump>),
        });
        Ok(self)
    }

    /// Consume `subscription` as events of type `E`.
    pub fn with_event<E: Event>(
        mut self,
        subscription: Subscription,
    ) -> Result<Self, ConfigurationError> {
        let pump = MessagePump::<E>::event(Arc::clone(&self.processor), &subscription)?;
        self.connections.push(Connection {
            subscription,
            pump: Box::new(move || Box::new(pump.clone()) as Box<dyn Pump>),
        });
        Ok(self)
    }

    /// Start every performer. Calling it again while running does nothing.
    pub fn receive(&mut self) -> Result<(), ConfigurationError> {
        if !self.performers.is_empty() {
            return Ok(());
        }

        // create every channel first so a bad subscription starts nothing
        let mut pending = Vec::new();
        for connection in &self.connections {
            for index in 0..connection.subscription.no_of_performers {
                let channel = self.channels.create_channel(&connection.subscription)?;
                let name = format!("{}-{}", connection.subscription.name, index);
                pending.push((name, channel, (connection.pump)()));
            }
        }

        for (name, channel, pump) in pending {
            debug!(performer = %name, channel = %channel.name(), "starting performer");
            self.performers.push(Performer::spawn(name, channel, pump));
        }
        info!(performers = self.performers.len(), "dispatcher started");
        Ok(())
    }

    pub fn performers(&self) -> &[Performer] {
        &self.performers
    }

    /// Stop every channel and wait for the performers. Returns each
    /// performer's name and statistics, in start order.
    pub fn end(&mut self) -> Vec<(String, PumpStats)> {
        for performer in &self.performers {
            performer.stop();
        }
        let results: Vec<(String, PumpStats)> = self
            .performers
            .drain(..)
            .map(|performer| {
                let name = performer.name.clone();
                (name, performer.join())
            })
            .collect();
        info!(performers = results.len(), "dispatcher stopped");
        results
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for performer in &self.performers {
            performer.stop();
        }
    }
}
