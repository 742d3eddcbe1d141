use crate::{NodeError, NodeId, RunId, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Core trait that every node type implements.
///
/// Processors are opaque to the engine: it hands them a [`NodeContext`] and
/// stores whatever value they return under the node's id.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Execute the node with given context
    async fn process(&self, ctx: NodeContext) -> Result<Value, NodeError>;

    /// Check a node's configuration before a run is admitted.
    fn validate_config(&self, _config: &BTreeMap<String, Value>) -> Result<(), NodeError> {
        Ok(())
    }

    /// Description shown in node listings.
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ProcessorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Runtime status of one node within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    /// Scheduled but held back because its run is paused.
    Paused,
}

impl NodeStatus {
    pub fn is_waiting(self) -> bool {
        matches!(self, NodeStatus::Idle | NodeStatus::Paused)
    }
}

/// Execution context passed to each processor invocation
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub node_name: String,

    /// The run's input data bag.
    pub data: Value,

    /// Results of nodes that completed before this invocation started.
    pub results: BTreeMap<NodeId, Value>,

    /// Static configuration for this node
    pub config: BTreeMap<String, Value>,

    /// Zero for the first invocation, incremented on every retry.
    pub attempt: u32,

    /// Fired when the run is cancelled. Honouring it is up to the processor.
    pub cancellation: CancellationToken,
}

impl NodeContext {
    pub fn new(run_id: RunId, node_id: impl Into<NodeId>) -> Self {
        let node_id = node_id.into();
        Self {
            run_id,
            node_name: node_id.clone(),
            node_id,
            data: Value::object(),
            results: BTreeMap::new(),
            config: BTreeMap::new(),
            attempt: 0,
            cancellation: CancellationToken::new(),
        }
    }

    /// Result of an upstream node, or an error naming it.
    pub fn require_result(&self, node_id: &str) -> Result<&Value, NodeError> {
        self.results
            .get(node_id)
            .ok_or_else(|| NodeError::MissingInput(node_id.to_string()))
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, NodeError> {
        self.config
            .get(name)
            .ok_or_else(|| NodeError::Configuration(format!("Missing config: {}", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
