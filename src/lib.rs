//! Client-side engine for a shielded pool: the `transact()` wire codec, transaction submission
//! (direct or through a relayer) and the sync pass that rebuilds a private balance from the
//! pool's transaction history.

/// Chain JSON-RPC access and signing seam
pub mod chain;
/// Relayer HTTP client
pub mod relayer;
/// Layered configuration
pub mod settings;
/// Wire codec, builder and submission
pub mod transaction;
/// Shared helpers
pub mod utils;
/// Sync passes
pub mod wallet;

#[cfg(test)]
pub(crate) mod test_support;
