use crate::{Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type WorkflowId = String;
pub type NodeId = String;
pub type ConnectionId = String;

/// Complete workflow definition, as authored by an editor or loaded from JSON.
///
/// Immutable while a run is executing it; the orchestrator keeps its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub configuration: WorkflowConfig,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            connections: Vec::new(),
            configuration: WorkflowConfig::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_config(mut self, configuration: WorkflowConfig) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn add_node(&mut self, node: NodeSpec) -> Result<NodeId, WorkflowError> {
        if self.find_node(&node.id).is_some() {
            return Err(WorkflowError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        Ok(id)
    }

    /// Connect two existing nodes. Rejects self connections and repeated pairs.
    pub fn connect(
        &mut self,
        from_node: impl Into<NodeId>,
        to_node: impl Into<NodeId>,
    ) -> Result<ConnectionId, WorkflowError> {
        let from_node = from_node.into();
        let to_node = to_node.into();

        for id in [&from_node, &to_node] {
            if self.find_node(id).is_none() {
                return Err(WorkflowError::NodeNotFound(id.clone()));
            }
        }
        if from_node == to_node {
            return Err(WorkflowError::SelfConnection(from_node));
        }
        if self
            .connections
            .iter()
            .any(|c| c.from_node_id == from_node && c.to_node_id == to_node)
        {
            return Err(WorkflowError::DuplicateConnection {
                from: from_node,
                to: to_node,
            });
        }

        let connection = Connection::new(from_node, to_node);
        let id = connection.id.clone();
        self.connections.push(connection);
        Ok(id)
    }

    /// Remove a node together with every connection touching it.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.connections
            .retain(|c| c.from_node_id != id && c.to_node_id != id);
        true
    }

    pub fn remove_connection(&mut self, id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != id);
        self.connections.len() != before
    }

    pub fn find_node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import a workflow exported by [`Workflow::to_json`] or written by hand.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let workflow: Workflow = serde_json::from_str(json)?;
        if workflow.id.trim().is_empty() {
            return Err(WorkflowError::Invalid("workflow id must not be empty".to_string()).into());
        }
        if let Some(node) = workflow.nodes.iter().find(|n| n.id.trim().is_empty()) {
            return Err(WorkflowError::Invalid(format!(
                "node '{}' has an empty id",
                node.name
            ))
            .into());
        }
        Ok(workflow)
    }
}

/// Node specification in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    #[serde(default)]
    pub configuration: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeSpec {
    pub fn new(id: impl Into<NodeId>, node_type: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            node_type: node_type.into(),
            configuration: BTreeMap::new(),
            position: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Directed dependency edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    /// Carried for editors; the scheduler never evaluates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Connection {
    pub fn new(from_node: impl Into<NodeId>, to_node: impl Into<NodeId>) -> Self {
        Self {
            id: format!("conn_{}", Uuid::new_v4().simple()),
            from_node_id: from_node.into(),
            to_node_id: to_node.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Node position in visual editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Workflow-level execution settings. Callers may override each of them per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    pub parallel_execution: bool,
    pub error_handling: ErrorHandling,
    pub max_retries: u32,
    /// Per-node timeout in milliseconds.
    #[serde(rename = "timeout", skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            parallel_execution: true,
            error_handling: ErrorHandling::Stop,
            max_retries: 3,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorHandling {
    /// Fail the run at the first node failure.
    #[default]
    Stop,
    /// Record the failure and keep running independent chains.
    Continue,
    /// Re-invoke the failing node with exponential backoff.
    Retry,
}

impl std::str::FromStr for ErrorHandling {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stop" => Ok(ErrorHandling::Stop),
            "continue" => Ok(ErrorHandling::Continue),
            "retry" => Ok(ErrorHandling::Retry),
            other => Err(WorkflowError::Invalid(format!(
                "unknown error handling '{}', expected stop, continue or retry",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> Workflow {
        let mut wf = Workflow::new("test");
        for id in ["a", "b", "c"] {
            wf.add_node(NodeSpec::new(id, "debug.log")).unwrap();
        }
        wf
    }

    #[test]
    fn connect_rejects_invalid_edges() {
        let mut wf = three_nodes();
        wf.connect("a", "b").unwrap();

        assert_eq!(
            wf.connect("a", "a"),
            Err(WorkflowError::SelfConnection("a".to_string()))
        );
        assert!(matches!(
            wf.connect("a", "b"),
            Err(WorkflowError::DuplicateConnection { .. })
        ));
        assert_eq!(
            wf.connect("a", "zzz"),
            Err(WorkflowError::NodeNotFound("zzz".to_string()))
        );
        assert_eq!(wf.connections.len(), 1);
    }

    #[test]
    fn add_node_rejects_duplicate_ids() {
        let mut wf = three_nodes();
        assert_eq!(
            wf.add_node(NodeSpec::new("b", "debug.log")),
            Err(WorkflowError::DuplicateNode("b".to_string()))
        );
    }

    #[test]
    fn remove_node_drops_its_connections() {
        let mut wf = three_nodes();
        wf.connect("a", "b").unwrap();
        let keep = wf.connect("a", "c").unwrap();
        wf.connect("b", "c").unwrap();

        assert!(wf.remove_node("b"));
        assert!(!wf.remove_node("b"));
        assert_eq!(wf.connections.len(), 1);
        assert_eq!(wf.connections[0].id, keep);
        assert!(wf.remove_connection(&keep));
        assert!(wf.connections.is_empty());
    }

    #[test]
    fn json_round_trip_uses_editor_field_names() {
        let mut wf = three_nodes();
        wf.connect("a", "b").unwrap();
        wf.configuration.timeout_ms = Some(500);

        let json = wf.to_json().unwrap();
        assert!(json.contains("\"fromNodeId\""));
        assert!(json.contains("\"parallelExecution\""));
        assert!(json.contains("\"timeout\": 500"));
        assert!(json.contains("\"type\": \"debug.log\""));

        assert_eq!(Workflow::from_json(&json).unwrap(), wf);
    }

    #[test]
    fn from_json_fills_defaults_and_rejects_empty_ids() {
        let wf = Workflow::from_json(
            r#"{"id": "wf", "name": "n", "nodes": [{"id": "a", "type": "t", "name": "A"}]}"#,
        )
        .unwrap();
        assert_eq!(wf.configuration, WorkflowConfig::default());
        assert!(wf.connections.is_empty());

        let err = Workflow::from_json(r#"{"id": " ", "name": "n", "nodes": []}"#).unwrap_err();
        assert!(err.to_string().contains("workflow id"));
        assert!(Workflow::from_json(r#"{"name": "missing id"}"#).is_err());
    }

    #[test]
    fn error_handling_parses_case_insensitively() {
        assert_eq!("Retry".parse::<ErrorHandling>().unwrap(), ErrorHandling::Retry);
        assert!("explode".parse::<ErrorHandling>().is_err());
    }
}
