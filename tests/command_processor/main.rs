//! Command processor integration tests.
//!
//! - Send reaches exactly one handler, or fails before any runs
//! - Publish fans out in registration order and stops at the first failure
//! - Pipelines are assembled from directives and released after each call

mod pipeline;
mod publish;
mod send;
