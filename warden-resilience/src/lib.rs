//! Bounded waiting for Warden
//!
//! Every wait in the supervisor is bounded: health probes, boot waits and
//! pid handshakes all run a fixed number of attempts separated by a tick.

pub mod poll;
pub mod retry;

// Re-export commonly used types
pub use poll::{poll_until, PollOutcome};
pub use retry::{RetryError, RetryExecutor, RetryPolicy, Retryable};
