//! SQLite persistence for the sync engine: mutation queue, sync state and
//! the local read cache.

pub mod db;
pub mod errors;
pub mod schema;
pub mod sync;
