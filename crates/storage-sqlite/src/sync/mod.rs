//! SQLite-backed implementations of the sync engine's store contracts.

mod cache_repository;
mod model;
mod queue_repository;
mod state_repository;

pub use cache_repository::SqliteReadCache;
pub use queue_repository::SqliteMutationQueue;
pub use state_repository::SqliteSyncState;
