use crate::{ErrorHandling, NodeId, NodeStatus, Value, WorkflowConfig, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub type RunId = Uuid;

/// Lifecycle of a run.
///
/// `pending → running ⇄ paused → {completed | failed | cancelled}`; the last
/// three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    /// Admitted and holding an execution slot.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Caller-supplied overrides for a single run. Unset fields fall back to the
/// workflow's [`WorkflowConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    pub parallel_execution: Option<bool>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub error_handling: Option<ErrorHandling>,
}

impl StartOptions {
    pub fn sequential(mut self) -> Self {
        self.parallel_execution = Some(false);
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel_execution = Some(true);
        self
    }

    pub fn with_error_handling(mut self, handling: ErrorHandling) -> Self {
        self.error_handling = Some(handling);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Options a run actually executes with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOptions {
    pub parallel_execution: bool,
    pub max_retries: u32,
    pub timeout_ms: Option<u64>,
    pub error_handling: ErrorHandling,
}

impl RunOptions {
    /// Merge caller overrides over the workflow configuration; the caller wins.
    pub fn resolve(config: &WorkflowConfig, overrides: &StartOptions) -> Self {
        Self {
            parallel_execution: overrides
                .parallel_execution
                .unwrap_or(config.parallel_execution),
            max_retries: overrides.max_retries.unwrap_or(config.max_retries),
            timeout_ms: overrides.timeout_ms.or(config.timeout_ms),
            error_handling: overrides.error_handling.unwrap_or(config.error_handling),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub node_id: Option<NodeId>,
    pub node_name: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningRecord {
    pub node_id: Option<NodeId>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Mutable per-run data: input bag, results and the error/warning log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub data: Value,
    pub results: BTreeMap<NodeId, Value>,
    pub errors: Vec<ErrorRecord>,
    pub warnings: Vec<WarningRecord>,
}

impl ExecutionContext {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn push_error(
        &mut self,
        node_id: Option<NodeId>,
        node_name: Option<String>,
        message: impl Into<String>,
    ) {
        self.errors.push(ErrorRecord {
            node_id,
            node_name,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn push_warning(&mut self, node_id: Option<NodeId>, message: impl Into<String>) {
        self.warnings.push(WarningRecord {
            node_id,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }
}

/// Snapshot of one execution of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub workflow_name: String,
    pub status: RunStatus,
    /// 0 to 100; reaches 100 only when the run completes.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub options: RunOptions,
    pub context: ExecutionContext,
    pub node_statuses: BTreeMap<NodeId, NodeStatus>,
    pub current_node: Option<NodeId>,
}

impl PipelineRun {
    pub fn completed_nodes(&self) -> usize {
        self.node_statuses
            .values()
            .filter(|s| **s == NodeStatus::Completed)
            .count()
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_options_take_precedence() {
        let config = WorkflowConfig {
            parallel_execution: true,
            error_handling: ErrorHandling::Stop,
            max_retries: 3,
            timeout_ms: Some(1_000),
        };

        let resolved = RunOptions::resolve(
            &config,
            &StartOptions::default()
                .sequential()
                .with_error_handling(ErrorHandling::Retry),
        );
        assert!(!resolved.parallel_execution);
        assert_eq!(resolved.error_handling, ErrorHandling::Retry);
        assert_eq!(resolved.max_retries, 3);
        assert_eq!(resolved.timeout(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn terminal_and_active_states() {
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(RunStatus::Paused.is_active());
        assert!(!RunStatus::Pending.is_active());
        assert_eq!(RunStatus::Completed.to_string(), "completed");
    }
}
