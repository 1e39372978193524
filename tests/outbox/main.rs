//! Outbox integration tests.
//!
//! - Deposits join the caller's transaction and are idempotent by id
//! - Sweeps send outstanding records once and leave failures for later
//! - Dispatched records are archived, then deleted

mod support;
mod archive;
mod deposit;
mod sweep;
