use std::sync::Mutex;

use event_emitter_rs::EventEmitter;

use super::Producer;
use crate::error::ProducerError;
use crate::message::Message;

/// Emits messages on an in-process `EventEmitter`, keyed by topic.
///
/// Listeners receive the body as a string (lossy UTF-8). The emitter runs
/// listeners on their own threads.
pub struct LocalEmitterProducer {
    emitter: Mutex<EventEmitter>,
}

impl LocalEmitterProducer {
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            emitter: Mutex::new(emitter),
        }
    }
}

impl Producer for LocalEmitterProducer {
    fn send(&self, message: &Message) -> Result<(), ProducerError> {
        let payload = String::from_utf8_lossy(&message.body.bytes).into_owned();
        let mut emitter = self.emitter.lock().map_err(|_| ProducerError::LockPoisoned)?;
        emitter.emit(message.topic(), payload);
        Ok(())
    }
}
