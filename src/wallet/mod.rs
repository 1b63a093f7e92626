/// Sync passes and their collaborators
pub mod sync;
/// Wallet sync errors
pub mod types;

pub use sync::{StateSync, SyncKey, SyncPhase, SyncReport};
pub use types::*;
