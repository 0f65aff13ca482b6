//! REST client for the Thriftly backend, implementing the engine's push
//! and pull contracts.

pub mod client;
pub mod error;

pub use client::ConnectClient;
pub use error::{ConnectError, Result};
