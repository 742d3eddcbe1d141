use crate::run::RunId;
use crate::validation::ValidationReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Workflow validation failed: {}", .0.summary())]
    Validation(ValidationReport),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single node invocation.
///
/// Every variant is handled the same way by the run's error policy; the
/// distinction only matters for the recorded message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("No processor for node type: {0}")]
    NoProcessor(String),

    #[error("Node execution timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Max retries exceeded: {0}")]
    RetriesExhausted(Box<NodeError>),

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::ExecutionFailed(message.into())
    }
}

/// Problems authoring or importing a workflow definition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node {0} cannot be connected to itself")]
    SelfConnection(String),

    #[error("Connection {from} -> {to} already exists")]
    DuplicateConnection { from: String, to: String },

    #[error("Invalid workflow: {0}")]
    Invalid(String),
}
