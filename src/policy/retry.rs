use std::thread;
use std::time::Duration;

use tracing::warn;

use super::{Operation, Policy};
use crate::error::HandlerError;

/// Retries retryable failures a fixed number of times with a fixed delay.
///
/// Errors that are not `HandlerError::is_retryable` (rejections, validation
/// failures, broken circuits) are returned immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Allow up to `retries` further attempts after the first one.
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Policy for RetryPolicy {
    fn execute(&self, operation: Operation<'_>) -> Result<(), HandlerError> {
        let mut attempt = 0u32;
        loop {
            match operation() {
                Ok(()) => return Ok(()),
                Err(error) if error.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, retries = self.retries, %error, "retrying after failure");
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}
