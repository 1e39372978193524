//! Translation between requests and wire messages.
//!
//! `post`/`deposit_post` map a request to a `Message` before it enters the
//! outbox; the message pump maps received messages back into requests. Both
//! directions go through the `MessageMapper` registered for the request type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, DispatchError, MappingError};
use crate::message::{Message, MessageBody, MessageHeader, MessageType};
use crate::request::{short_type_name, Request};

/// Where a request type is published and as what kind of message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub topic: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl Publication {
    pub fn command(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message_type: MessageType::Command,
            reply_to: None,
        }
    }

    pub fn event(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            message_type: MessageType::Event,
            reply_to: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// Maps `R` to and from a wire message.
pub trait MessageMapper<R: Request>: Send + Sync {
    fn to_message(&self, request: &R, publication: &Publication) -> Result<Message, MappingError>;

    fn to_request(&self, message: &Message) -> Result<R, MappingError>;
}

/// Maps serde requests to JSON bodies. The message id is the request id, so
/// re-posting the same request deposits the same outbox record.
pub struct JsonMessageMapper<R> {
    _request: PhantomData<fn() -> R>,
}

impl<R> JsonMessageMapper<R> {
    pub fn new() -> Self {
        Self { _request: PhantomData }
    }
}

impl<R> Default for JsonMessageMapper<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for JsonMessageMapper<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonMessageMapper")
            .field("request", &short_type_name(std::any::type_name::<R>()))
            .finish()
    }
}

impl<R> MessageMapper<R> for JsonMessageMapper<R>
where
    R: Request + Serialize + DeserializeOwned,
{
    fn to_message(&self, request: &R, publication: &Publication) -> Result<Message, MappingError> {
        let body = MessageBody::json(request).map_err(|e| MappingError::Serialize {
            request: short_type_name(request.request_type()).to_string(),
            reason: e.to_string(),
        })?;
        let mut header =
            MessageHeader::new(request.id(), publication.topic.clone(), publication.message_type);
        if let Some(correlation_id) = request.correlation_id() {
            header = header.with_correlation_id(correlation_id);
        }
        if let Some(reply_to) = &publication.reply_to {
            header = header.with_reply_to(reply_to.clone());
        }
        Ok(Message::new(header, body))
    }

    fn to_request(&self, message: &Message) -> Result<R, MappingError> {
        message.body.decode_json().map_err(|e| MappingError::Deserialize {
            message_id: message.id().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Mappers and publications, keyed by request type.
#[derive(Default)]
pub struct MessageMapperRegistry {
    mappers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    publications: HashMap<TypeId, Publication>,
}

impl fmt::Debug for MessageMapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageMapperRegistry")
            .field("mappers", &self.mappers.len())
            .field("publications", &self.publications.values().collect::<Vec<_>>())
            .finish()
    }
}

impl MessageMapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<R, M>(&mut self, mapper: M) -> &mut Self
    where
        R: Request,
        M: MessageMapper<R> + 'static,
    {
        let mapper: Arc<dyn MessageMapper<R>> = Arc::new(mapper);
        self.mappers.insert(TypeId::of::<R>(), Box::new(mapper));
        self
    }

    /// Register a `JsonMessageMapper` for `R`.
    pub fn register_json<R>(&mut self) -> &mut Self
    where
        R: Request + Serialize + DeserializeOwned,
    {
        self.register::<R, _>(JsonMessageMapper::<R>::new())
    }

    pub fn register_publication<R: Request>(&mut self, publication: Publication) -> &mut Self {
        self.publications.insert(TypeId::of::<R>(), publication);
        self
    }

    pub fn mapper<R: Request>(&self) -> Result<Arc<dyn MessageMapper<R>>, ConfigurationError> {
        self.mappers
            .get(&TypeId::of::<R>())
            .and_then(|boxed| boxed.downcast_ref::<Arc<dyn MessageMapper<R>>>())
            .cloned()
            .ok_or_else(|| ConfigurationError::NoMapper {
                request: short_type_name(std::any::type_name::<R>()).to_string(),
            })
    }

    pub fn publication<R: Request>(&self) -> Result<&Publication, ConfigurationError> {
        self.publications
            .get(&TypeId::of::<R>())
            .ok_or_else(|| ConfigurationError::NoPublication {
                request: short_type_name(std::any::type_name::<R>()).to_string(),
            })
    }

    /// Map `request` using its registered mapper and publication.
    pub fn to_message<R: Request>(&self, request: &R) -> Result<Message, DispatchError> {
        let mapper = self.mapper::<R>()?;
        let publication = self.publication::<R>()?;
        Ok(mapper.to_message(request, publication)?)
    }
}
