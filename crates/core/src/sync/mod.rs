//! Offline sync engine: models, orchestration, status, scheduling.

mod connectivity;
mod engine;
mod model;
mod orchestrator;
mod reconciler;
mod scheduler;
mod status;

pub use connectivity::*;
pub use engine::*;
pub use model::*;
pub use orchestrator::*;
pub use reconciler::*;
pub use scheduler::*;
pub use status::*;
