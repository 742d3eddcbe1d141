use crate::graph::WorkflowGraph;
use reelcore::{IssueCode, ValidationIssue, ValidationReport, Workflow};
use std::collections::HashSet;

/// Structural checks that decide whether a workflow may run.
///
/// Registry-dependent checks (unknown node types, node configuration) are
/// added by [`crate::Orchestrator::validate`].
pub fn validate(workflow: &Workflow) -> ValidationReport {
    let mut report = ValidationReport::default();

    if workflow.nodes.is_empty() {
        report.error(ValidationIssue::new(
            IssueCode::NoNodes,
            "Workflow must have at least one node",
        ));
        return report;
    }

    let mut ids = HashSet::new();
    for node in &workflow.nodes {
        if !ids.insert(node.id.as_str()) {
            report.error(
                ValidationIssue::new(
                    IssueCode::DuplicateNodeId,
                    format!("Node id {} is used more than once", node.id),
                )
                .for_node(&node.id),
            );
        }
    }

    let mut pairs = HashSet::new();
    for conn in &workflow.connections {
        for endpoint in [&conn.from_node_id, &conn.to_node_id] {
            if !ids.contains(endpoint.as_str()) {
                report.error(
                    ValidationIssue::new(
                        IssueCode::InvalidConnection,
                        format!(
                            "Connection {} references non-existent node {}",
                            conn.id, endpoint
                        ),
                    )
                    .for_node(endpoint),
                );
            }
        }

        if conn.from_node_id == conn.to_node_id {
            report.error(
                ValidationIssue::new(
                    IssueCode::SelfConnection,
                    format!("Node {} is connected to itself", conn.from_node_id),
                )
                .for_node(&conn.from_node_id),
            );
        } else if !pairs.insert((conn.from_node_id.as_str(), conn.to_node_id.as_str())) {
            report.error(ValidationIssue::new(
                IssueCode::DuplicateConnection,
                format!(
                    "Connection {} -> {} is declared more than once",
                    conn.from_node_id, conn.to_node_id
                ),
            ));
        }
    }

    let graph = WorkflowGraph::build(workflow);

    if let Some(cycle) = graph.find_cycle() {
        tracing::debug!(cycle = %cycle.join(" -> "), "cycle detected");
        report.error(ValidationIssue::new(
            IssueCode::CircularDependency,
            "Workflow contains circular dependencies",
        ));
    }

    // A self connection already makes its node non-starting; report it once.
    let starting = graph.starting_nodes();
    if starting.is_empty() && !report.has_error(IssueCode::SelfConnection) {
        report.error(ValidationIssue::new(
            IssueCode::NoStartingNode,
            "Workflow has no starting node; every node has an incoming connection",
        ));
    }

    if workflow.nodes.len() > 1 {
        let reachable = graph.reachable_from_starts();
        let mut seen = HashSet::new();
        for node in &workflow.nodes {
            if !seen.insert(node.id.as_str()) {
                continue;
            }
            if graph.is_isolated(&node.id) {
                report.warning(
                    ValidationIssue::new(
                        IssueCode::IsolatedNode,
                        format!("Node {} has no connections", node.name),
                    )
                    .for_node(&node.id),
                );
            } else if !reachable.contains(&node.id) {
                report.warning(
                    ValidationIssue::new(
                        IssueCode::UnreachableNode,
                        format!("Node {} is not reachable from any starting node", node.name),
                    )
                    .for_node(&node.id),
                );
            }
        }
    }

    report
}
