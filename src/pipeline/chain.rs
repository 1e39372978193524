use tracing::debug;

use super::{Middleware, PipelineTracer, Proceed};
use crate::error::HandlerError;
use crate::handler::{Handler, Lifetime, RequestContext};
use crate::request::Request;

pub(crate) enum NodeKind<R: Request> {
    Middleware(Box<dyn Middleware>),
    Handler(Box<dyn Handler<R>>),
}

pub(crate) struct Node<R: Request> {
    pub(crate) kind: NodeKind<R>,
    pub(crate) lifetime: Lifetime,
    pub(crate) name: String,
}

impl<R: Request> Node<R> {
    fn dispose(&mut self) {
        match &mut self.kind {
            NodeKind::Middleware(m) => m.dispose(),
            NodeKind::Handler(h) => h.dispose(),
        }
    }
}

/// An assembled chain of middleware around one handler, for one dispatch.
///
/// Nodes run in order; "successor" is simply the next element. The pipeline
/// owns every instance the assembler created for it. When it is dropped,
/// transient instances are disposed exactly once and singletons are left
/// alone. Dropping happens on every exit path, including early returns
/// and unwinding.
pub struct Pipeline<R: Request> {
    handler: String,
    pub(crate) nodes: Vec<Node<R>>,
    released: bool,
}

impl<R: Request> Pipeline<R> {
    pub(crate) fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            nodes: Vec::new(),
            released: false,
        }
    }

    /// Name of the terminal handler.
    pub fn handler_name(&self) -> &str {
        &self.handler
    }

    /// Execute every node head to tail.
    pub fn call(&mut self, request: &R, context: &RequestContext) -> Result<(), HandlerError> {
        let mut chain = Chain {
            nodes: &mut self.nodes,
            request,
            context,
        };
        chain.proceed()
    }

    pub fn trace(&self) -> PipelineTracer {
        let mut tracer = PipelineTracer::new();
        for node in &self.nodes {
            tracer.add_to_path(node.name.clone());
        }
        tracer
    }

    /// Names of the instances this pipeline will dispose on release.
    pub fn owned_instances(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.lifetime == Lifetime::Transient)
            .map(|n| n.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut disposed = 0usize;
        for node in self.nodes.iter_mut().filter(|n| n.lifetime == Lifetime::Transient) {
            node.dispose();
            disposed += 1;
        }
        debug!(handler = %self.handler, disposed, "pipeline released");
    }
}

impl<R: Request> Drop for Pipeline<R> {
    fn drop(&mut self) {
        self.release();
    }
}

struct Chain<'a, R: Request> {
    nodes: &'a mut [Node<R>],
    request: &'a R,
    context: &'a RequestContext,
}

impl<R: Request> Proceed for Chain<'_, R> {
    fn request(&self) -> &dyn Request {
        self.request
    }

    fn context(&self) -> &RequestContext {
        self.context
    }

    fn proceed(&mut self) -> Result<(), HandlerError> {
        let Some((head, rest)) = self.nodes.split_first_mut() else {
            return Ok(());
        };
        let mut tail = Chain {
            nodes: rest,
            request: self.request,
            context: self.context,
        };
        match &mut head.kind {
            NodeKind::Middleware(middleware) => middleware.handle(&mut tail),
            NodeKind::Handler(handler) => {
                handler.handle(self.request, self.context)?;
                tail.proceed()
            }
        }
    }
}
