//! Injected collaborators.
//!
//! The engine never reaches for ambient state: remote generation,
//! persistence and progress reporting are handed to it as trait objects
//! at construction time.

mod memory;
mod progress;
mod remote;
mod store;

pub use memory::InMemoryProjectStore;
pub use progress::{NoOpProgress, ProgressReporter};
pub use remote::{RemoteExecutor, RemoteStageOutput, StageExecutionRequest};
pub use store::ProjectStore;
