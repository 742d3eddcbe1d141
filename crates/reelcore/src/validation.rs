use crate::workflow::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable code attached to every validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    NoNodes,
    NoStartingNode,
    CircularDependency,
    DuplicateNodeId,
    InvalidConnection,
    SelfConnection,
    DuplicateConnection,
    InvalidNodeConfig,
    UnreachableNode,
    IsolatedNode,
    UnknownNodeType,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::NoNodes => "NO_NODES",
            IssueCode::NoStartingNode => "NO_STARTING_NODE",
            IssueCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            IssueCode::DuplicateNodeId => "DUPLICATE_NODE_ID",
            IssueCode::InvalidConnection => "INVALID_CONNECTION",
            IssueCode::SelfConnection => "SELF_CONNECTION",
            IssueCode::DuplicateConnection => "DUPLICATE_CONNECTION",
            IssueCode::InvalidNodeConfig => "INVALID_NODE_CONFIG",
            IssueCode::UnreachableNode => "UNREACHABLE_NODE",
            IssueCode::IsolatedNode => "ISOLATED_NODE",
            IssueCode::UnknownNodeType => "UNKNOWN_NODE_TYPE",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

impl ValidationIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_id: None,
        }
    }

    pub fn for_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }
}

/// Outcome of validating a workflow. Errors block a run; warnings do not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, issue: ValidationIssue) {
        self.errors.push(issue);
    }

    pub fn warning(&mut self, issue: ValidationIssue) {
        self.warnings.push(issue);
    }

    pub fn has_error(&self, code: IssueCode) -> bool {
        self.errors.iter().any(|issue| issue.code == code)
    }

    pub fn has_warning(&self, code: IssueCode) -> bool {
        self.warnings.iter().any(|issue| issue.code == code)
    }

    /// Error messages joined for display.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
