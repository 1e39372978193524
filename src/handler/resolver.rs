use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Handler, RequestContext};
use crate::error::{ConfigurationError, HandlerError};
use crate::pipeline::{Middleware, Next, RequestLogging, Validation};
use crate::policy::UsePolicy;
use crate::request::{short_type_name, Request};

/// How long a resolved instance lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lifetime {
    /// Created for one dispatch and disposed after it.
    #[default]
    Transient,
    /// Shared by every dispatch; never disposed by a pipeline.
    Singleton,
}

/// Identity of a handler type, as stored in the subscriber registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    type_id: TypeId,
    name: &'static str,
}

impl HandlerKey {
    pub fn of<H: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            name: std::any::type_name::<H>(),
        }
    }

    pub fn name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

/// A resolved handler or middleware together with its lifetime.
pub struct Instance<T> {
    pub value: T,
    pub lifetime: Lifetime,
}

type HandlerFactory<R> = Arc<dyn Fn() -> Box<dyn Handler<R>> + Send + Sync>;
type MiddlewareFactory =
    Arc<dyn Fn(&[Value]) -> Result<Box<dyn Middleware>, ConfigurationError> + Send + Sync>;

enum HandlerSource<R: Request> {
    Transient(HandlerFactory<R>),
    Singleton(Arc<Mutex<Box<dyn Handler<R>>>>, &'static str),
}

enum MiddlewareSource {
    Transient(MiddlewareFactory),
    Singleton(Arc<dyn Middleware + Sync>, String),
}

/// Creates handler and middleware instances for a dispatch.
///
/// Handlers are registered per (handler type, request type) with an explicit
/// `Lifetime`. Middleware is registered by name; the names used in
/// `MiddlewareDirective`s must resolve here, otherwise pipeline assembly
/// fails with `ConfigurationError::UnknownMiddleware`.
///
/// `HandlerResolver::new()` registers the built-in middleware:
/// `"logging"` (`RequestLogging`), `"validation"` (`Validation`) and
/// `"policy"` (`UsePolicy`).
pub struct HandlerResolver {
    handlers: HashMap<(TypeId, TypeId), Box<dyn Any + Send + Sync>>,
    middleware: HashMap<String, MiddlewareSource>,
}

impl Default for HandlerResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.middleware.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("HandlerResolver")
            .field("handlers", &self.handlers.len())
            .field("middleware", &names)
            .finish()
    }
}

impl HandlerResolver {
    pub fn new() -> Self {
        let mut resolver = Self::empty();
        resolver.register_middleware("logging", |params| {
            Ok(Box::new(RequestLogging::from_params(params)?) as Box<dyn Middleware>)
        });
        resolver.register_middleware("validation", |_| {
            Ok(Box::new(Validation) as Box<dyn Middleware>)
        });
        resolver.register_middleware("policy", |params| {
            Ok(Box::new(UsePolicy::from_params(params)?) as Box<dyn Middleware>)
        });
        resolver
    }

    /// A resolver without the built-in middleware.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            middleware: HashMap::new(),
        }
    }

    /// Register a handler created fresh for every dispatch.
    pub fn register_transient<R, H, F>(&mut self, factory: F) -> &mut Self
    where
        R: Request,
        H: Handler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let factory: HandlerFactory<R> =
            Arc::new(move || Box::new(factory()) as Box<dyn Handler<R>>);
        self.handlers.insert(
            (TypeId::of::<H>(), TypeId::of::<R>()),
            Box::new(HandlerSource::Transient(factory)),
        );
        self
    }

    /// Register one handler instance shared by every dispatch.
    pub fn register_singleton<R, H>(&mut self, handler: H) -> &mut Self
    where
        R: Request,
        H: Handler<R> + 'static,
    {
        let name = short_type_name(std::any::type_name::<H>());
        let shared: Arc<Mutex<Box<dyn Handler<R>>>> = Arc::new(Mutex::new(Box::new(handler)));
        self.handlers.insert(
            (TypeId::of::<H>(), TypeId::of::<R>()),
            Box::new(HandlerSource::Singleton(shared, name)),
        );
        self
    }

    /// Register a handler with the given lifetime; singletons are built once, now.
    pub fn register<R, H, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        R: Request,
        H: Handler<R> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        match lifetime {
            Lifetime::Transient => self.register_transient::<R, H, F>(factory),
            Lifetime::Singleton => self.register_singleton::<R, H>(factory()),
        }
    }

    /// Register middleware by name. The factory receives the directive's
    /// init params and may reject them with a configuration error.
    pub fn register_middleware<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Box<dyn Middleware>, ConfigurationError> + Send + Sync + 'static,
    {
        self.middleware
            .insert(name.into(), MiddlewareSource::Transient(Arc::new(factory)));
        self
    }

    /// Register a shared middleware instance. Init params are ignored.
    ///
    /// The instance is called concurrently and re-entrantly, without a lock,
    /// and is never disposed.
    pub fn register_singleton_middleware<M>(
        &mut self,
        name: impl Into<String>,
        middleware: M,
    ) -> &mut Self
    where
        M: Middleware + Sync + 'static,
    {
        let display = middleware.name().to_string();
        let shared: Arc<dyn Middleware + Sync> = Arc::new(middleware);
        self.middleware
            .insert(name.into(), MiddlewareSource::Singleton(shared, display));
        self
    }

    pub fn has_handler<R: Request>(&self, key: &HandlerKey) -> bool {
        self.handlers.contains_key(&(key.type_id, TypeId::of::<R>()))
    }

    pub(crate) fn has_handler_for(&self, key: &HandlerKey, request: TypeId) -> bool {
        self.handlers.contains_key(&(key.type_id, request))
    }

    pub fn has_middleware(&self, name: &str) -> bool {
        self.middleware.contains_key(name)
    }

    /// Create (or fetch the shared) handler registered under `key` for `R`.
    pub fn resolve_handler<R: Request>(
        &self,
        key: &HandlerKey,
    ) -> Result<Instance<Box<dyn Handler<R>>>, ConfigurationError> {
        let source = self
            .handlers
            .get(&(key.type_id, TypeId::of::<R>()))
            .and_then(|boxed| boxed.downcast_ref::<HandlerSource<R>>())
            .ok_or_else(|| ConfigurationError::HandlerNotRegistered {
                handler: key.name().to_string(),
                request: short_type_name(std::any::type_name::<R>()).to_string(),
            })?;

        Ok(match source {
            HandlerSource::Transient(factory) => Instance {
                value: factory(),
                lifetime: Lifetime::Transient,
            },
            HandlerSource::Singleton(shared, name) => Instance {
                value: Box::new(SharedHandler {
                    inner: Arc::clone(shared),
                    name: *name,
                }),
                lifetime: Lifetime::Singleton,
            },
        })
    }

    /// Create (or fetch the shared) middleware registered under `name`.
    pub fn resolve_middleware(
        &self,
        name: &str,
        params: &[Value],
        handler: &str,
    ) -> Result<Instance<Box<dyn Middleware>>, ConfigurationError> {
        let source = self
            .middleware
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownMiddleware {
                name: name.to_string(),
                handler: handler.to_string(),
            })?;

        Ok(match source {
            MiddlewareSource::Transient(factory) => Instance {
                value: factory(params)?,
                lifetime: Lifetime::Transient,
            },
            MiddlewareSource::Singleton(shared, display) => Instance {
                value: Box::new(SharedMiddleware {
                    inner: Arc::clone(shared),
                    name: display.clone(),
                }),
                lifetime: Lifetime::Singleton,
            },
        })
    }
}

/// Handle to a singleton handler; locks the shared instance per call.
struct SharedHandler<R: Request> {
    inner: Arc<Mutex<Box<dyn Handler<R>>>>,
    name: &'static str,
}

impl<R: Request> Handler<R> for SharedHandler<R> {
    fn handle(&mut self, request: &R, context: &RequestContext) -> Result<(), HandlerError> {
        let mut handler = self
            .inner
            .lock()
            .map_err(|_| HandlerError::LockPoisoned("shared handler"))?;
        handler.handle(request, context)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Handle to a singleton middleware. Calls go straight through to the
/// shared instance.
struct SharedMiddleware {
    inner: Arc<dyn Middleware + Sync>,
    name: String,
}

impl Middleware for SharedMiddleware {
    fn handle(&self, next: Next<'_>) -> Result<(), HandlerError> {
        self.inner.handle(next)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
