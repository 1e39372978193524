//! Command processor: Send, Publish and outbox-mediated Post.
//!
//! ## Dispatch rules
//!
//! - `send(command)`: the command type must have exactly one registered
//!   handler. Zero or several is a `ConfigurationError` and no handler runs.
//! - `publish(event)`: zero or more handlers, invoked in registration order,
//!   each through its own pipeline and its own copy of the request context.
//!   The first failure stops the fan-out and is returned.
//! - `post(request)` / `deposit_post(request, tx)`: map the request to a
//!   message and deposit it in the outbox. Nothing is sent here; a sweep (or
//!   an explicit `clear_outbox`) delivers it later.
//!
//! Every pipeline is built for one dispatch and released when the call
//! returns, on success, error or panic alike.
//!
//! ## Example
//!
//! ```ignore
//! let processor = CommandProcessor::builder()
//!     .with_handler::<CreateOrder, CreateOrderHandler, _>(Lifetime::Transient, || CreateOrderHandler)
//!     .with_outbox(InMemoryOutbox::new())
//!     .build()?;
//!
//! processor.send(&CreateOrder { id: new_id(), sku: "A-1".into() })?;
//! ```

mod builder;

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

pub use builder::CommandProcessorBuilder;

use crate::error::{ConfigurationError, DispatchError};
use crate::handler::{HandlerResolver, RequestContext};
use crate::mapper::MessageMapperRegistry;
use crate::outbox::{dispatch_ids, OutboxStore, SweepResult};
use crate::pipeline::PipelineBuilder;
use crate::policy::PolicyRegistry;
use crate::producer::ProducerRegistry;
use crate::registry::{HandlerDescriptor, SubscriberRegistry};
use crate::request::{short_type_name, Command, Event, Request};

/// Dispatches requests to handlers through middleware pipelines and
/// deposits messages in the outbox.
///
/// `CommandProcessor` is `Send + Sync`; share it with `Arc` between
/// dispatching threads and message pump performers.
pub struct CommandProcessor {
    registry: SubscriberRegistry,
    resolver: HandlerResolver,
    policies: Arc<PolicyRegistry>,
    mappers: MessageMapperRegistry,
    outbox: Option<Arc<dyn OutboxStore>>,
    producers: ProducerRegistry,
}

impl CommandProcessor {
    pub fn builder() -> CommandProcessorBuilder {
        CommandProcessorBuilder::new()
    }

    /// A fresh context for one dispatch.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(Arc::clone(&self.policies))
    }

    /// Dispatch a command to its single handler.
    pub fn send<C: Command>(&self, command: &C) -> Result<(), DispatchError> {
        self.send_with_context(command, &self.context())
    }

    pub fn send_with_context<C: Command>(
        &self,
        command: &C,
        context: &RequestContext,
    ) -> Result<(), DispatchError> {
        let descriptors = self.registry.get::<C>();
        let descriptor = match descriptors {
            [single] => single,
            [] => {
                return Err(ConfigurationError::NoHandler {
                    request: short_type_name(std::any::type_name::<C>()).to_string(),
                }
                .into())
            }
            many => {
                return Err(ConfigurationError::AmbiguousHandler {
                    request: short_type_name(std::any::type_name::<C>()).to_string(),
                    count: many.len(),
                }
                .into())
            }
        };

        debug!(request_type = descriptor.request_name(), request_id = %command.id(), "send");
        self.dispatch(command, descriptor, context)
    }

    /// Dispatch an event to every handler registered for it.
    pub fn publish<E: Event>(&self, event: &E) -> Result<(), DispatchError> {
        self.publish_with_context(event, &self.context())
    }

    pub fn publish_with_context<E: Event>(
        &self,
        event: &E,
        context: &RequestContext,
    ) -> Result<(), DispatchError> {
        let descriptors = self.registry.get::<E>();
        debug!(
            request_type = short_type_name(std::any::type_name::<E>()),
            request_id = %event.id(),
            subscribers = descriptors.len(),
            "publish"
        );
        for descriptor in descriptors {
            self.dispatch(event, descriptor, &context.copy())?;
        }
        Ok(())
    }

    fn dispatch<R: Request>(
        &self,
        request: &R,
        descriptor: &HandlerDescriptor,
        context: &RequestContext,
    ) -> Result<(), DispatchError> {
        let mut pipeline = PipelineBuilder::new(&self.resolver)
            .with_policies(&self.policies)
            .build::<R>(descriptor)?;
        pipeline.call(request, context)?;
        Ok(())
    }

    /// Deposit a request in the outbox for later delivery.
    pub fn post<R: Request>(&self, request: &R) -> Result<(), DispatchError> {
        self.deposit_post(request, None).map(|_| ())
    }

    /// Map a request to a message and add it to the outbox, inside
    /// `transaction` when given. Returns the message id.
    pub fn deposit_post<R: Request>(
        &self,
        request: &R,
        transaction: Option<&mut dyn Any>,
    ) -> Result<String, DispatchError> {
        let outbox = self.outbox.as_ref().ok_or(ConfigurationError::NoOutbox)?;
        let message = self.mappers.to_message(request)?;
        let id = message.id().to_string();
        outbox.add(message, transaction)?;
        debug!(
            message_id = %id,
            request_type = short_type_name(std::any::type_name::<R>()),
            "deposited"
        );
        Ok(id)
    }

    /// Send the given deposited messages now instead of waiting for a sweep.
    /// Ids that are unknown or already dispatched are skipped.
    pub fn clear_outbox(&self, ids: &[String]) -> Result<SweepResult, DispatchError> {
        let outbox = self.outbox.as_ref().ok_or(ConfigurationError::NoOutbox)?;
        Ok(dispatch_ids(outbox.as_ref(), &self.producers, ids)?)
    }

    pub fn registry(&self) -> &SubscriberRegistry {
        &self.registry
    }

    pub fn mappers(&self) -> &MessageMapperRegistry {
        &self.mappers
    }

    pub fn outbox(&self) -> Option<&Arc<dyn OutboxStore>> {
        self.outbox.as_ref()
    }

    pub fn producers(&self) -> &ProducerRegistry {
        &self.producers
    }
}
