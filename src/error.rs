//! Error taxonomy for dispatch, outbox, and channel operations.
//!
//! Configuration errors are fatal and raised at registration, assembly, or
//! construction time. Handler errors are business or transient failures and
//! always reach the caller of `send`/`publish`. Transport and outbox store
//! errors surface to whoever drives the channel or the sweep.

use std::error::Error;
use std::time::Duration;

use thiserror::Error;

/// A misconfigured registry, pipeline, channel, or subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no handler registered for command {request}")]
    NoHandler { request: String },

    #[error("ambiguous handler for command {request}: {count} registered, expected exactly one")]
    AmbiguousHandler { request: String, count: usize },

    #[error("unknown middleware `{name}` on handler {handler}")]
    UnknownMiddleware { name: String, handler: String },

    #[error("invalid middleware directive: {0}")]
    InvalidDirective(String),

    #[error("invalid init params for middleware `{middleware}`: {reason}")]
    InvalidInitParams { middleware: String, reason: String },

    #[error("handler {handler} is registered for {request} but has no factory in the resolver")]
    HandlerNotRegistered { handler: String, request: String },

    #[error("channel buffer size {size} is out of range, must be between {min} and {max}")]
    BufferSize { size: usize, min: usize, max: usize },

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("no producer registered for topic `{topic}`")]
    NoProducer { topic: String },

    #[error("no message mapper registered for {request}")]
    NoMapper { request: String },

    #[error("no publication registered for {request}")]
    NoPublication { request: String },

    #[error("no outbox configured on the command processor")]
    NoOutbox,

    #[error("unknown policy `{name}`")]
    UnknownPolicy { name: String },
}

/// Failure raised by a handler or a middleware while processing a request.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The request failed validation before reaching the handler.
    #[error("validation failed for {request}: {reason}")]
    Validation { request: String, reason: String },

    /// The handler cannot process the request now; a message pump requeues it.
    #[error("deferred: {0}")]
    Defer(String),

    /// A circuit breaker is open and the call was not attempted.
    #[error("circuit broken: {0}")]
    BrokenCircuit(String),

    /// A shared handler or middleware instance was poisoned by a panic.
    #[error("handler lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("handler error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }

    /// Whether a retry policy may attempt the call again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Defer(_) | HandlerError::Other(_))
    }
}

/// Failure translating between a request and a wire message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("failed to serialize {request}: {reason}")]
    Serialize { request: String, reason: String },

    #[error("failed to deserialize message {message_id}: {reason}")]
    Deserialize { message_id: String, reason: String },
}

/// Failure sending a message through a transport producer.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("topic `{topic}` unavailable: {reason}")]
    Unavailable { topic: String, reason: String },

    #[error("message rejected by broker: {0}")]
    Rejected(String),

    #[error("send timed out")]
    Timeout,

    #[error("producer lock poisoned")]
    LockPoisoned,

    #[error("producer error: {0}")]
    Other(Box<dyn Error + Send + Sync>),
}

/// Failure on the consumption side of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("cannot enqueue {attempted} messages, larger than the buffer length {capacity}")]
    BufferOverflow { attempted: usize, capacity: usize },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("channel closed")]
    Closed,

    #[error("channel lock poisoned during {0}")]
    LockPoisoned(&'static str),
}

/// Failure from an outbox store or the sweep/archive machinery around it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboxError {
    #[error("outbox operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("transaction context is not supported by this outbox")]
    UnsupportedTransaction,

    #[error("transaction already committed or rolled back")]
    TransactionClosed,

    #[error("outbox storage error: {0}")]
    Storage(String),

    #[error("archive failed: {0}")]
    Archive(String),
}

/// Error returned by the command processor's entry points.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Outbox(#[from] OutboxError),

    #[error(transparent)]
    Producer(#[from] ProducerError),
}

impl DispatchError {
    /// Fatal errors stop a message pump instead of being retried.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DispatchError::Configuration(_))
    }

    /// The handler asked for the message to be requeued.
    pub fn is_deferred(&self) -> bool {
        matches!(self, DispatchError::Handler(HandlerError::Defer(_)))
    }

    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            DispatchError::Handler(err) => Some(err),
            _ => None,
        }
    }
}
