use std::sync::Arc;

use serde_json::Value;

use super::Policy;
use crate::error::{ConfigurationError, HandlerError};
use crate::pipeline::{Middleware, Next, Proceed};

/// Runs the rest of the pipeline under one or more named policies.
///
/// Registered as `"policy"`. Init params are policy names; the first name is
/// the outermost policy.
#[derive(Debug, Clone)]
pub struct UsePolicy {
    names: Vec<String>,
}

impl UsePolicy {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_params(params: &[Value]) -> Result<Self, ConfigurationError> {
        if params.is_empty() {
            return Err(invalid("at least one policy name is required".into()));
        }
        let names = params
            .iter()
            .map(|p| match p {
                Value::String(name) => Ok(name.clone()),
                other => Err(invalid(format!("policy names must be strings, got {other}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }
}

fn invalid(reason: String) -> ConfigurationError {
    ConfigurationError::InvalidInitParams {
        middleware: "policy".into(),
        reason,
    }
}

fn run(policies: &[Arc<dyn Policy>], next: &mut dyn Proceed) -> Result<(), HandlerError> {
    match policies.split_first() {
        None => next.proceed(),
        Some((policy, rest)) => policy.execute(&mut || run(rest, next)),
    }
}

impl Middleware for UsePolicy {
    fn handle(&self, next: Next<'_>) -> Result<(), HandlerError> {
        let policies = self
            .names
            .iter()
            .map(|name| next.context().policies().get(name))
            .collect::<Result<Vec<_>, _>>()
            .map_err(HandlerError::other)?;
        run(&policies, next)
    }

    fn policies(&self) -> &[String] {
        &self.names
    }
}
