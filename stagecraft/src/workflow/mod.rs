//! Stage graph and stage state machine.
//!
//! [`StageGraph`] answers "what may run next" and "why is this stage
//! locked"; [`transition`] is the only place stage status changes.

mod graph;
mod state;

pub use graph::StageGraph;
pub use state::{transition, TransitionOutcome};
