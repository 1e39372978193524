//! Fixtures shared by the consumption tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use relay_rust::{
    Command, Handler, HandlerError, Message, MessageBody, MessageType, Request, RequestContext,
};
use serde::{Deserialize, Serialize};

pub const TOPIC: &str = "invoices";

pub fn text(body: &str) -> Message {
    Message::create(TOPIC, MessageType::Command, MessageBody::text(body))
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    check()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub id: String,
    pub amount: u64,
}

impl IssueInvoice {
    pub fn new(amount: u64) -> Self {
        Self {
            id: relay_rust::new_id(),
            amount,
        }
    }
}

impl Request for IssueInvoice {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Command for IssueInvoice {}

/// Defers zero-amount invoices, counts the rest.
pub struct IssueInvoiceHandler {
    pub issued: Arc<AtomicUsize>,
}

impl Handler<IssueInvoice> for IssueInvoiceHandler {
    fn handle(&mut self, invoice: &IssueInvoice, _: &RequestContext) -> Result<(), HandlerError> {
        if invoice.amount == 0 {
            return Err(HandlerError::Defer("amount not priced yet".into()));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
