use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Middleware, Next};
use crate::error::{ConfigurationError, HandlerError};
use crate::request::short_type_name;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Level {
    Debug,
    #[default]
    Info,
}

/// Logs the request before its successor runs and the outcome after.
///
/// Registered as `"logging"`. Accepts one optional init param, the level:
/// `"info"` (default) or `"debug"`.
#[derive(Debug, Default)]
pub struct RequestLogging {
    level: Level,
}

impl RequestLogging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &[Value]) -> Result<Self, ConfigurationError> {
        let level = match params.first() {
            None => Level::Info,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("info") => Level::Info,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("debug") => Level::Debug,
            Some(other) => {
                return Err(ConfigurationError::InvalidInitParams {
                    middleware: "logging".into(),
                    reason: format!("expected \"info\" or \"debug\", got {other}"),
                })
            }
        };
        Ok(Self { level })
    }
}

impl Middleware for RequestLogging {
    fn handle(&self, next: Next<'_>) -> Result<(), HandlerError> {
        let request_type = short_type_name(next.request().request_type());
        let request_id = next.request().id().to_string();

        match self.level {
            Level::Info => info!(request_type, %request_id, "handling request"),
            Level::Debug => debug!(request_type, %request_id, "handling request"),
        }

        let started = Instant::now();
        let result = next.proceed();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => match self.level {
                Level::Info => info!(request_type, %request_id, elapsed_ms, "request handled"),
                Level::Debug => debug!(request_type, %request_id, elapsed_ms, "request handled"),
            },
            Err(error) => warn!(request_type, %request_id, elapsed_ms, %error, "request failed"),
        }
        result
    }
}
