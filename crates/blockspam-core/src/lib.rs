//! blockspam core
//!
//! The load harness and the node domain types. This crate has no
//! dependencies on:
//! - Network/gRPC
//! - Process setup (argument parsing, logging installation)
//!
//! A run is wired from three pluggable pieces:
//! - a [`ParamSource`] that draws one parameter per task,
//! - a [`Pipeline`] that executes the timed stages for one parameter,
//! - a [`Reporter`] that receives every [`TaskResult`] and the final [`RunStats`].
//!
//! The [`Scheduler`] launches the tasks and the [`Aggregator`] drains their results.

pub mod block;
pub mod config;
pub mod error;
pub mod params;
pub mod report;
pub mod scheduler;
pub mod stage;
pub mod task;

// Re-export commonly used types
pub use block::{BlockHeader, Hash, RoundEvent, RoundSummary, RoundTransaction, RuntimeId};
pub use config::RunConfig;
pub use error::{BoxError, DecodeError, TaskError};
pub use params::{ParamSource, RandomRange, SeededRange, Sequence};
pub use report::{Aggregator, JsonReporter, Reporter, RunStats, TextReporter};
pub use scheduler::Scheduler;
pub use stage::{StageTimings, StageTracker, TaskContext};
pub use task::{Pipeline, TaskParam, TaskResult};
