use tracing::warn;

use super::{Middleware, Next};
use crate::error::HandlerError;
use crate::request::short_type_name;

/// Runs `Request::validate` and short-circuits the chain on failure.
///
/// Registered as `"validation"`; takes no init params.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validation;

impl Middleware for Validation {
    fn handle(&self, next: Next<'_>) -> Result<(), HandlerError> {
        let request = next.request();
        if let Err(reason) = request.validate() {
            let request_type = short_type_name(request.request_type());
            warn!(request_type, request_id = %request.id(), %reason, "request failed validation");
            return Err(HandlerError::Validation {
                request: request_type.to_string(),
                reason,
            });
        }
        next.proceed()
    }
}
