//! Agent loop: model turns, tool execution and run results.

pub mod runner;
mod tooling;
pub mod types;

pub(crate) use runner::AgentLoop;
pub use runner::{BlockingRunStream, RunEventStream};
pub use types::{RunId, RunMode, RunResult, RunState, RunStreamEvent};
