//! Core domain logic for the Thriftly offline sync engine.
//!
//! This crate owns the sync engine proper: the mutation queue contract, the
//! orchestrator that drains it against the backend, status broadcasting to
//! the UI layer, and the background scheduler. Storage and transport live in
//! sibling crates behind the traits defined here.

pub mod errors;
pub mod sync;

pub use errors::{Error, Result};
