//! Workflow execution runtime
//!
//! This crate provides the run controller ([`Orchestrator`]), the processor
//! registry, workflow validation and the dependency-driven executor that
//! schedules nodes of a run with bounded concurrency.

mod executor;
mod graph;
mod registry;
mod retry;
mod runtime;
mod state;
mod validator;

pub use graph::WorkflowGraph;
pub use registry::{FnProcessor, ProcessorRegistry};
pub use retry::{ErrorPolicy, FailureAction};
pub use runtime::{Orchestrator, RuntimeConfig};
pub use validator::validate;
