//! Core abstractions for the reel pipeline engine
//!
//! This crate provides the workflow and run data model, the dynamic `Value`
//! type, the `Processor` trait that node implementations plug into, and the
//! progress events runs emit. Scheduling lives in `reelruntime`.

mod error;
pub mod events;
mod node;
mod run;
mod validation;
mod value;
mod workflow;

pub use error::{NodeError, PipelineError, WorkflowError};
pub use events::{ProgressEvent, ProgressObserver, ProgressPublisher};
pub use node::{NodeContext, NodeStatus, Processor, ProcessorMetadata};
pub use run::{
    ErrorRecord, ExecutionContext, PipelineRun, RunId, RunOptions, RunStatus, StartOptions,
    WarningRecord,
};
pub use validation::{IssueCode, ValidationIssue, ValidationReport};
pub use value::Value;
pub use workflow::{
    Connection, ConnectionId, ErrorHandling, NodeId, NodeSpec, Position, Workflow, WorkflowConfig,
    WorkflowId,
};

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
