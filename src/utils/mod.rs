//!
//! Shared helpers.
//!
//! Amount formatting, the bounded retry policy applied to read calls, and the keyed
//! exclusive locks that serialize sync passes and submissions.
/// Formatting helpers
pub mod index;
/// Per-key exclusive locks
pub mod locks;
/// Bounded retries for read calls
pub mod retry;

pub use index::format_token_amount;
pub use locks::KeyedLocks;
pub use retry::{RetryPolicy, Retryable};
