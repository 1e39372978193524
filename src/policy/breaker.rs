use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

use super::{Operation, Policy};
use crate::error::HandlerError;

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Fails fast for a cooldown period after too many consecutive failures.
///
/// Once the cooldown elapses one trial call is let through; success closes
/// the circuit, failure opens it again.
#[derive(Debug)]
pub struct CircuitBreakerPolicy {
    name: String,
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreakerPolicy {
    pub fn new(name: impl Into<String>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn is_open(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(state.open_until, Some(until) if Instant::now() < until)
    }
}

impl Policy for CircuitBreakerPolicy {
    fn execute(&self, operation: Operation<'_>) -> Result<(), HandlerError> {
        if self.is_open() {
            return Err(HandlerError::BrokenCircuit(self.name.clone()));
        }

        let result = operation();

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &result {
            Ok(()) => {
                state.consecutive_failures = 0;
                state.open_until = None;
            }
            Err(_) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                if state.consecutive_failures >= self.threshold {
                    state.open_until = Some(Instant::now() + self.cooldown);
                    warn!(
                        breaker = %self.name,
                        failures = state.consecutive_failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "circuit opened"
                    );
                }
            }
        }
        result
    }
}
