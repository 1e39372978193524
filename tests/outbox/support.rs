//! Fixtures shared by the outbox tests.

use std::sync::Arc;

use relay_rust::outbox::InMemoryOutbox;
use relay_rust::{CommandProcessor, Event, InMemoryBus, Publication, Request};
use serde::{Deserialize, Serialize};

pub const TOPIC: &str = "orders.shipped";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub id: String,
    pub order: u64,
}

impl OrderShipped {
    pub fn new(order: u64) -> Self {
        Self {
            id: relay_rust::new_id(),
            order,
        }
    }
}

impl Request for OrderShipped {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Event for OrderShipped {}

/// A processor posting `OrderShipped` to `TOPIC` through `outbox`, sent on `bus`.
pub fn processor(outbox: &InMemoryOutbox, bus: &InMemoryBus) -> Arc<CommandProcessor> {
    Arc::new(
        CommandProcessor::builder()
            .with_json_mapper::<OrderShipped>(Publication::event(TOPIC))
            .with_outbox(outbox.clone())
            .with_producer(TOPIC, bus.clone())
            .build()
            .unwrap(),
    )
}
