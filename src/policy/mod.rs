//! Named retry and circuit-breaker policies.
//!
//! Policies are registered by name in a `PolicyRegistry` held by the command
//! processor. The `"policy"` middleware (`UsePolicy`) runs the rest of the
//! pipeline under the policies named in its init params.

mod breaker;
mod retry;
mod use_policy;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use breaker::CircuitBreakerPolicy;
pub use retry::RetryPolicy;
pub use use_policy::UsePolicy;

use crate::error::{ConfigurationError, HandlerError};

/// The operation a policy wraps: the remainder of a pipeline.
pub type Operation<'a> = &'a mut dyn FnMut() -> Result<(), HandlerError>;

/// Executes an operation under some resilience rule.
pub trait Policy: Send + Sync + fmt::Debug {
    fn execute(&self, operation: Operation<'_>) -> Result<(), HandlerError>;
}

/// Policies available to pipelines, by name.
#[derive(Debug, Default, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<String, Arc<dyn Policy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, policy: impl Policy + 'static) -> &mut Self {
        self.policies.insert(name.into(), Arc::new(policy));
        self
    }

    pub fn with(mut self, name: impl Into<String>, policy: impl Policy + 'static) -> Self {
        self.add(name, policy);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Policy>, ConfigurationError> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownPolicy { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
