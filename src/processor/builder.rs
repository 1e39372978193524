use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::CommandProcessor;
use crate::error::ConfigurationError;
use crate::handler::{Handler, HandlerResolver, Lifetime};
use crate::mapper::{MessageMapper, MessageMapperRegistry, Publication};
use crate::outbox::OutboxStore;
use crate::pipeline::{Middleware, MiddlewareDirective};
use crate::policy::{Policy, PolicyRegistry};
use crate::producer::{Producer, ProducerRegistry};
use crate::registry::{HandlerDescriptor, SubscriberRegistry};
use crate::request::Request;

/// Builder for `CommandProcessor`.
///
/// `build` checks that every registered descriptor has a handler factory in
/// the resolver, and creates every middleware its directives name once to
/// check the name, the init params and any policies it uses. A
/// misconfigured processor fails at startup instead of on its first
/// dispatch.
pub struct CommandProcessorBuilder {
    registry: SubscriberRegistry,
    resolver: HandlerResolver,
    policies: PolicyRegistry,
    mappers: MessageMapperRegistry,
    outbox: Option<Arc<dyn OutboxStore>>,
    producers: ProducerRegistry,
}

impl Default for CommandProcessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessorBuilder {
    pub fn new() -> Self {
        Self {
            registry: SubscriberRegistry::new(),
            resolver: HandlerResolver::new(),
            policies: PolicyRegistry::new(),
            mappers: MessageMapperRegistry::new(),
            outbox: None,
            producers: ProducerRegistry::new(),
        }
    }

    /// Register `H` for `R` in both the subscriber registry and the resolver,
    /// using the directives `H` declares.
    pub fn with_handler<R, H, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        R: Request,
        H: Handler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.registry.register::<R, H>();
        self.resolver.register::<R, H, F>(lifetime, factory);
        self
    }

    /// Register `H` for `R` with explicitly supplied directives.
    pub fn with_descriptor<R, H, F>(
        mut self,
        descriptor: HandlerDescriptor,
        lifetime: Lifetime,
        factory: F,
    ) -> Self
    where
        R: Request,
        H: Handler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.registry.register_descriptor(descriptor);
        self.resolver.register::<R, H, F>(lifetime, factory);
        self
    }

    pub fn with_middleware<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Box<dyn Middleware>, ConfigurationError>
            + Send
            + Sync
            + 'static,
    {
        self.resolver.register_middleware(name, factory);
        self
    }

    pub fn with_singleton_middleware(
        mut self,
        name: impl Into<String>,
        middleware: impl Middleware + Sync + 'static,
    ) -> Self {
        self.resolver.register_singleton_middleware(name, middleware);
        self
    }

    pub fn with_policy(
        mut self,
        name: impl Into<String>,
        policy: impl Policy + 'static,
    ) -> Self {
        self.policies.add(name, policy);
        self
    }

    pub fn with_mapper<R, M>(mut self, mapper: M, publication: Publication) -> Self
    where
        R: Request,
        M: MessageMapper<R> + 'static,
    {
        self.mappers
            .register::<R, M>(mapper)
            .register_publication::<R>(publication);
        self
    }

    /// Map `R` as JSON and publish it per `publication`.
    pub fn with_json_mapper<R>(mut self, publication: Publication) -> Self
    where
        R: Request + Serialize + DeserializeOwned,
    {
        self.mappers
            .register_json::<R>()
            .register_publication::<R>(publication);
        self
    }

    pub fn with_outbox(self, outbox: impl OutboxStore + 'static) -> Self {
        self.with_shared_outbox(Arc::new(outbox))
    }

    pub fn with_shared_outbox(mut self, outbox: Arc<dyn OutboxStore>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_producer(
        mut self,
        topic: impl Into<String>,
        producer: impl Producer + 'static,
    ) -> Self {
        self.producers.add(topic, producer);
        self
    }

    pub fn with_producers(mut self, producers: ProducerRegistry) -> Self {
        self.producers = producers;
        self
    }

    /// Replace the resolver. Handlers registered through this builder
    /// before the call are lost.
    pub fn with_resolver(mut self, resolver: HandlerResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_registry(mut self, registry: SubscriberRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Result<CommandProcessor, ConfigurationError> {
        for descriptor in self.registry.descriptors() {
            let handler = descriptor.handler().name();
            if !self
                .resolver
                .has_handler_for(descriptor.handler(), descriptor.request_id())
            {
                return Err(ConfigurationError::HandlerNotRegistered {
                    handler: handler.to_string(),
                    request: descriptor.request_name().to_string(),
                });
            }
            for directive in descriptor.directives() {
                self.check_directive(directive, handler)?;
            }
        }

        Ok(CommandProcessor {
            registry: self.registry,
            resolver: self.resolver,
            policies: Arc::new(self.policies),
            mappers: self.mappers,
            outbox: self.outbox,
            producers: self.producers,
        })
    }

    /// Create the directive's middleware once, so unknown names, bad init
    /// params and unknown policies fail here. The instance is then released.
    fn check_directive(
        &self,
        directive: &MiddlewareDirective,
        handler: &str,
    ) -> Result<(), ConfigurationError> {
        let mut middleware =
            self.resolver
                .resolve_middleware(&directive.middleware, &directive.params, handler)?;
        let unknown = middleware
            .value
            .policies()
            .iter()
            .find(|name| !self.policies.contains(name))
            .cloned();
        if middleware.lifetime == Lifetime::Transient {
            middleware.value.dispose();
        }
        match unknown {
            Some(name) => Err(ConfigurationError::UnknownPolicy { name }),
            None => Ok(()),
        }
    }
}
