//! Handlers and the resolver that creates them for each dispatch.
//!
//! A `Handler<R>` processes one request type. Handlers are not constructed by
//! the caller of `send`/`publish`: the `HandlerResolver` creates them from
//! registered factories, and every registration carries an explicit
//! `Lifetime`:
//!
//! - `Lifetime::Transient`: a fresh instance per dispatch, owned by that
//!   dispatch's pipeline and disposed exactly once when the pipeline is
//!   released (on every exit path, including errors and panics).
//! - `Lifetime::Singleton`: one shared instance, reused by every dispatch and
//!   never disposed by a pipeline.
//!
//! ## Example
//!
//! ```ignore
//! struct GreetHandler;
//!
//! impl Handler<Greet> for GreetHandler {
//!     fn handle(&mut self, request: &Greet, _ctx: &RequestContext) -> Result<(), HandlerError> {
//!         tracing::info!(name = %request.name, "hello");
//!         Ok(())
//!     }
//!
//!     fn directives() -> Vec<MiddlewareDirective> {
//!         vec![
//!             MiddlewareDirective::before(0, "validation"),
//!             MiddlewareDirective::after(0, "logging"),
//!         ]
//!     }
//! }
//! ```

mod context;
mod resolver;

#[cfg(feature = "async")]
mod blocking;

pub use context::RequestContext;
pub use resolver::{HandlerKey, HandlerResolver, Instance, Lifetime};

#[cfg(feature = "async")]
pub use blocking::{AsyncHandler, BlockingHandler};

use crate::error::HandlerError;
use crate::pipeline::MiddlewareDirective;
use crate::request::{short_type_name, Request};

/// Processes requests of type `R`.
pub trait Handler<R: Request>: Send {
    /// Handle the request. Returning `Ok` continues into any After-phase
    /// middleware; returning `Err` stops the pipeline and reaches the caller.
    fn handle(&mut self, request: &R, context: &RequestContext) -> Result<(), HandlerError>;

    /// Name shown in pipeline traces.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Release resources held by a transient instance. Called exactly once,
    /// after the dispatch that created the instance.
    fn dispose(&mut self) {}

    /// Middleware declared on this handler, read once at registration.
    fn directives() -> Vec<MiddlewareDirective>
    where
        Self: Sized,
    {
        Vec::new()
    }
}
