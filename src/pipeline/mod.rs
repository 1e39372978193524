//! Middleware pipelines.
//!
//! Handlers declare `MiddlewareDirective`s (phase, ordinal, middleware name,
//! init params). For every dispatch the `PipelineBuilder` turns the handler
//! and its directives into a `Pipeline`: an ordered list of nodes in which the
//! successor of a node is the next element. A middleware continues with
//! `next.proceed()` or returns early to short-circuit; a handler that returns
//! `Ok` continues into the After-phase middleware.
//!
//! ```ignore
//! let pipeline = PipelineBuilder::new(&resolver).build::<Greet>(&descriptor)?;
//! assert_eq!(pipeline.trace().to_string(), "Validation | GreetHandler | RequestLogging |");
//! ```

mod builder;
mod chain;
mod directive;
mod logging;
mod middleware;
mod tracer;
mod validation;

pub use builder::PipelineBuilder;
pub use chain::Pipeline;
pub use directive::{MiddlewareDirective, Phase};
pub use logging::RequestLogging;
pub use middleware::{Middleware, Next, Proceed};
pub use tracer::PipelineTracer;
pub use validation::Validation;
