use crate::error::HandlerError;
use crate::handler::RequestContext;
use crate::request::{short_type_name, Request};

/// The rest of a pipeline, as seen by a middleware node.
pub trait Proceed {
    /// The request being dispatched.
    fn request(&self) -> &dyn Request;

    fn context(&self) -> &RequestContext;

    /// Run the remaining nodes. May be called more than once (retries).
    fn proceed(&mut self) -> Result<(), HandlerError>;
}

/// Handle to the successor of a middleware node.
pub type Next<'a> = &'a mut dyn Proceed;

/// A step wrapped around handler execution.
///
/// A middleware continues the chain with `next.proceed()`; returning without
/// calling it short-circuits the remaining nodes.
///
/// `handle` takes `&self`: a singleton instance runs in every dispatch at
/// once, including dispatches nested inside its own `proceed()`. Keep
/// per-call state on the stack.
pub trait Middleware: Send {
    fn handle(&self, next: Next<'_>) -> Result<(), HandlerError>;

    /// Name shown in pipeline traces.
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Named policies this middleware looks up at execution time. The
    /// assembler checks them against the policy registry.
    fn policies(&self) -> &[String] {
        &[]
    }

    fn dispose(&mut self) {}
}
