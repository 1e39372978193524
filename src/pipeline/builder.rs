use tracing::debug;

use super::chain::{Node, NodeKind, Pipeline};
use super::directive::{ordered, Phase};
use crate::error::ConfigurationError;
use crate::handler::{Handler, HandlerResolver, Instance};
use crate::policy::PolicyRegistry;
use crate::registry::HandlerDescriptor;
use crate::request::Request;

/// Assembles pipelines from handler descriptors.
///
/// The chain is `[Before directives ascending] -> handler -> [After
/// directives ascending]`. Every middleware named by a directive is created
/// through the resolver while assembling, so an unknown name or bad init
/// params fail here and never during execution. If assembly fails part way,
/// the instances already created are disposed before the error is returned.
pub struct PipelineBuilder<'a> {
    resolver: &'a HandlerResolver,
    policies: Option<&'a PolicyRegistry>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(resolver: &'a HandlerResolver) -> Self {
        Self {
            resolver,
            policies: None,
        }
    }

    /// Check policy names used by middleware against this registry.
    pub fn with_policies(mut self, policies: &'a PolicyRegistry) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Resolve the descriptor's handler and assemble its pipeline.
    pub fn build<R: Request>(
        &self,
        descriptor: &HandlerDescriptor,
    ) -> Result<Pipeline<R>, ConfigurationError> {
        let handler = self.resolver.resolve_handler::<R>(descriptor.handler())?;
        self.assemble(handler, descriptor)
    }

    /// Link an already resolved handler with the descriptor's middleware.
    pub fn assemble<R: Request>(
        &self,
        handler: Instance<Box<dyn Handler<R>>>,
        descriptor: &HandlerDescriptor,
    ) -> Result<Pipeline<R>, ConfigurationError> {
        let handler_name = handler.value.name().to_string();
        let mut pipeline = Pipeline::new(handler_name.clone());
        pipeline.nodes.push(Node {
            kind: NodeKind::Handler(handler.value),
            lifetime: handler.lifetime,
            name: handler_name.clone(),
        });

        // Nodes are collected as [handler, before.., after..] and rotated into
        // place once everything resolved; a failure drops `pipeline`, which
        // disposes what was created so far.
        let before = ordered(descriptor.directives(), Phase::Before);
        let after = ordered(descriptor.directives(), Phase::After);
        for directive in before.iter().chain(after.iter()) {
            let middleware =
                self.resolver
                    .resolve_middleware(&directive.middleware, &directive.params, &handler_name)?;
            let name = middleware.value.name().to_string();
            let policies = middleware.value.policies().to_vec();
            pipeline.nodes.push(Node {
                kind: NodeKind::Middleware(middleware.value),
                lifetime: middleware.lifetime,
                name,
            });
            self.check_policies(&policies)?;
        }
        pipeline.nodes[..=before.len()].rotate_left(1);

        debug!(handler = %handler_name, path = %pipeline.trace(), "pipeline assembled");
        Ok(pipeline)
    }

    fn check_policies(&self, names: &[String]) -> Result<(), ConfigurationError> {
        let Some(registry) = self.policies else {
            return Ok(());
        };
        for name in names {
            if !registry.contains(name) {
                return Err(ConfigurationError::UnknownPolicy { name: name.clone() });
            }
        }
        Ok(())
    }
}
