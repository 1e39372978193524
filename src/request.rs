//! Requests: commands (exactly one handler) and events (zero or more handlers).

use std::any::Any;
use std::fmt;

/// Something the command processor can dispatch.
///
/// Every request has a unique id and may carry a correlation id linking it to
/// the request or reply that caused it. Requests are immutable once
/// dispatched; handlers receive `&R`.
///
/// ```
/// use relay_rust::{Command, Request};
///
/// #[derive(Debug)]
/// struct CreateOrder {
///     id: String,
///     sku: String,
/// }
///
/// impl Request for CreateOrder {
///     fn id(&self) -> &str {
///         &self.id
///     }
///
///     fn validate(&self) -> Result<(), String> {
///         if self.sku.is_empty() {
///             return Err("sku is required".into());
///         }
///         Ok(())
///     }
/// }
///
/// impl Command for CreateOrder {}
/// ```
pub trait Request: AsAny + Send + Sync + fmt::Debug {
    /// Unique identity of this request.
    fn id(&self) -> &str;

    /// Identity linking this request to related requests and replies.
    fn correlation_id(&self) -> Option<&str> {
        None
    }

    /// Checked by the `validation` middleware before the handler runs.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Type name used in diagnostics and error messages.
    fn request_type(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A request with exactly one authoritative handler. Dispatched with `send`.
pub trait Command: Request {}

/// A notification with zero or more independent handlers. Dispatched with `publish`.
pub trait Event: Request {}

/// Upcast helper so middleware can downcast a `&dyn Request` to a concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Request + '_ {
    /// Downcast to a concrete request type.
    pub fn downcast_ref<R: Request>(&self) -> Option<&R> {
        self.as_any().downcast_ref::<R>()
    }
}

/// Generate a fresh request or message id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Strip the module path from a type name: `a::b::Greet` becomes `Greet`.
///
/// Generic arguments are kept as written by the compiler.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
