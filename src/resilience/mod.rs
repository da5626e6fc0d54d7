//! Resilience primitives: retry with exponential backoff.

pub mod retry;

pub use retry::{retry, RetryConfig};
