//! Utility modules for newln-ai

pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy, Retryable};
