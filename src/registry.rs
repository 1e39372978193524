//! Subscriber registry: which handlers process which request type.

use std::any::TypeId;
use std::collections::HashMap;

use crate::handler::{Handler, HandlerKey};
use crate::pipeline::MiddlewareDirective;
use crate::request::{short_type_name, Request};

/// A request type to handler type mapping, with the handler's middleware.
///
/// Built explicitly at registration time; nothing is discovered at dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerDescriptor {
    request: &'static str,
    request_id: TypeId,
    handler: HandlerKey,
    directives: Vec<MiddlewareDirective>,
}

impl HandlerDescriptor {
    pub fn new<R, H>(directives: Vec<MiddlewareDirective>) -> Self
    where
        R: Request,
        H: Handler<R> + 'static,
    {
        Self {
            request: std::any::type_name::<R>(),
            request_id: TypeId::of::<R>(),
            handler: HandlerKey::of::<H>(),
            directives,
        }
    }

    /// Descriptor using the directives the handler type declares.
    pub fn of<R, H>() -> Self
    where
        R: Request,
        H: Handler<R> + 'static,
    {
        Self::new::<R, H>(H::directives())
    }

    pub fn with_directive(mut self, directive: MiddlewareDirective) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn request_name(&self) -> &'static str {
        short_type_name(self.request)
    }

    pub(crate) fn request_id(&self) -> TypeId {
        self.request_id
    }

    pub fn handler(&self) -> &HandlerKey {
        &self.handler
    }

    pub fn directives(&self) -> &[MiddlewareDirective] {
        &self.directives
    }
}

/// Maps request types to their handler descriptors, in registration order.
///
/// Commands are checked for exactly one handler at dispatch; events may have
/// any number.
#[derive(Clone, Debug, Default)]
pub struct SubscriberRegistry {
    observers: HashMap<TypeId, Vec<HandlerDescriptor>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `H` as a handler of `R` with the directives `H` declares.
    pub fn register<R, H>(&mut self) -> &mut Self
    where
        R: Request,
        H: Handler<R> + 'static,
    {
        self.register_descriptor(HandlerDescriptor::of::<R, H>())
    }

    /// Register an explicitly built descriptor, e.g. one whose directives
    /// were loaded from configuration. Descriptors are appended; a handler
    /// registered twice is listed twice.
    pub fn register_descriptor(&mut self, descriptor: HandlerDescriptor) -> &mut Self {
        self.observers
            .entry(descriptor.request_id)
            .or_default()
            .push(descriptor);
        self
    }

    /// Descriptors registered for `R`; empty when none are.
    pub fn get<R: Request>(&self) -> &[HandlerDescriptor] {
        self.observers
            .get(&TypeId::of::<R>())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every registered descriptor, in no particular request order.
    pub fn descriptors(&self) -> impl Iterator<Item = &HandlerDescriptor> {
        self.observers.values().flatten()
    }

    /// Number of request types with at least one handler.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
