use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::{Builder, Runtime};

use super::{Handler, RequestContext};
use crate::error::HandlerError;
use crate::request::{short_type_name, Request};

/// A handler whose work suspends on asynchronous I/O.
#[async_trait]
pub trait AsyncHandler<R: Request>: Send {
    async fn handle(&mut self, request: &R, context: &RequestContext) -> Result<(), HandlerError>;

    fn dispose(&mut self) {}
}

/// Runs an `AsyncHandler` inside the synchronous pipeline.
///
/// The future is driven to completion on a tokio runtime held by the
/// adapter, so callers of `send`/`publish` see an ordinary handler. The
/// dispatching thread blocks while the future runs, which means a pipeline
/// containing a `BlockingHandler` must not be executed from inside another
/// tokio runtime's worker thread.
pub struct BlockingHandler<H> {
    handler: H,
    runtime: Arc<Runtime>,
}

impl<H> BlockingHandler<H> {
    /// Wrap `handler` with a fresh current-thread runtime.
    pub fn new(handler: H) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        Ok(Self::with_runtime(handler, Arc::new(runtime)))
    }

    /// Wrap `handler`, sharing an existing runtime.
    pub fn with_runtime(handler: H, runtime: Arc<Runtime>) -> Self {
        Self { handler, runtime }
    }

    pub fn inner(&self) -> &H {
        &self.handler
    }
}

impl<R, H> Handler<R> for BlockingHandler<H>
where
    R: Request,
    H: AsyncHandler<R>,
{
    fn handle(&mut self, request: &R, context: &RequestContext) -> Result<(), HandlerError> {
        let runtime = Arc::clone(&self.runtime);
        runtime.block_on(self.handler.handle(request, context))
    }

    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<H>())
    }

    fn dispose(&mut self) {
        self.handler.dispose();
    }
}
