//! Consumption integration tests.
//!
//! - Channel buffering, stop and redelivery contract
//! - End-to-end: post, sweep, pump, handler

mod support;
mod channel;
mod end_to_end;
