pub mod channel;
pub mod error;
pub mod handler;
pub mod mapper;
pub mod message;
pub mod outbox;
pub mod pipeline;
pub mod policy;
pub mod processor;
pub mod producer;
pub mod pump;
pub mod registry;
mod request;

pub use channel::{Channel, ChannelFactory, MessageConsumer, Subscription};
pub use error::{
    ChannelError, ConfigurationError, DispatchError, HandlerError, MappingError, OutboxError,
    ProducerError,
};
pub use handler::{Handler, HandlerResolver, Lifetime, RequestContext};
pub use mapper::{JsonMessageMapper, MessageMapper, MessageMapperRegistry, Publication};
pub use message::{Message, MessageBody, MessageHeader, MessageType};
pub use outbox::{InMemoryOutbox, OutboxRecord, OutboxStore, OutboxSweeper, SweepResult};
pub use pipeline::{Middleware, MiddlewareDirective, Next, Phase, Pipeline, PipelineBuilder};
pub use policy::{Policy, PolicyRegistry};
pub use processor::{CommandProcessor, CommandProcessorBuilder};
pub use producer::{InMemoryBus, Producer, ProducerRegistry};
pub use pump::{Dispatcher, MessagePump, PumpStats};
pub use registry::{HandlerDescriptor, SubscriberRegistry};
pub use request::{new_id, AsAny, Command, Event, Request};

#[cfg(feature = "async")]
pub use handler::{AsyncHandler, BlockingHandler};

// Re-export the EventEmitter so callers of LocalEmitterProducer need not depend on event_emitter_rs
#[cfg(feature = "emitter")]
pub use event_emitter_rs::EventEmitter;
