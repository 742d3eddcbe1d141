use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use reelcore::{NodeId, Workflow};
use std::collections::{HashMap, HashSet};

/// Dependency graph of a workflow.
///
/// Edges point from a node to its dependents. Connections whose endpoints do
/// not exist are left out (the validator reports them); when node ids repeat,
/// the first declaration wins.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<NodeId, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    pub fn build(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in &workflow.nodes {
            if !index.contains_key(&node.id) {
                let idx = graph.add_node(node.id.clone());
                index.insert(node.id.clone(), idx);
            }
        }

        for conn in &workflow.connections {
            if let (Some(from), Some(to)) =
                (index.get(&conn.from_node_id), index.get(&conn.to_node_id))
            {
                graph.add_edge(*from, *to, ());
            }
        }

        Self { graph, index }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.index.contains_key(node_id)
    }

    /// Nodes without incoming connections, in declaration order.
    pub fn starting_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|idx| {
                self.graph
                    .neighbors_directed(*idx, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Source nodes of connections targeting `node_id`.
    pub fn dependencies(&self, node_id: &str) -> Vec<NodeId> {
        self.adjacent(node_id, Direction::Incoming)
    }

    /// Target nodes of connections leaving `node_id`.
    pub fn dependents(&self, node_id: &str) -> Vec<NodeId> {
        self.adjacent(node_id, Direction::Outgoing)
    }

    /// True when the node has no connections in either direction.
    pub fn is_isolated(&self, node_id: &str) -> bool {
        self.index.get(node_id).is_some_and(|idx| {
            self.graph
                .neighbors_undirected(*idx)
                .next()
                .is_none()
        })
    }

    /// Every node reachable by following connections from a starting node.
    pub fn reachable_from_starts(&self) -> HashSet<NodeId> {
        let mut reachable = HashSet::new();
        for start in self.starting_nodes() {
            let mut dfs = Dfs::new(&self.graph, self.index[&start]);
            while let Some(idx) = dfs.next(&self.graph) {
                reachable.insert(self.graph[idx].clone());
            }
        }
        reachable
    }

    /// Depth-first search for a node reachable from itself.
    ///
    /// Returns the path of the first cycle found, closing node repeated
    /// (`a -> b -> a`).
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let count = self.graph.node_count();
        let mut visited = vec![false; count];
        let mut on_stack = vec![false; count];

        for root in self.graph.node_indices() {
            if visited[root.index()] {
                continue;
            }

            visited[root.index()] = true;
            on_stack[root.index()] = true;
            let mut stack = vec![(root, self.successors(root).into_iter())];

            while let Some((node, successors)) = stack.last_mut() {
                let node = *node;
                match successors.next() {
                    Some(next) if on_stack[next.index()] => {
                        let start = stack
                            .iter()
                            .position(|(idx, _)| *idx == next)
                            .unwrap_or(0);
                        let mut cycle: Vec<NodeId> = stack[start..]
                            .iter()
                            .map(|(idx, _)| self.graph[*idx].clone())
                            .collect();
                        cycle.push(self.graph[next].clone());
                        return Some(cycle);
                    }
                    Some(next) if !visited[next.index()] => {
                        visited[next.index()] = true;
                        on_stack[next.index()] = true;
                        stack.push((next, self.successors(next).into_iter()));
                    }
                    Some(_) => {}
                    None => {
                        on_stack[node.index()] = false;
                        stack.pop();
                    }
                }
            }
        }

        None
    }

    fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.id(), e.target()))
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Neighbours in connection declaration order, without repeats.
    fn adjacent(&self, node_id: &str, direction: Direction) -> Vec<NodeId> {
        let Some(idx) = self.index.get(node_id) else {
            return Vec::new();
        };

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(*idx, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (e.id(), other)
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);

        let mut seen = HashSet::new();
        edges
            .into_iter()
            .filter(|(_, other)| seen.insert(*other))
            .map(|(_, other)| self.graph[other].clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcore::{Connection, NodeSpec};

    fn workflow(nodes: &[&str], edges: &[(&str, &str)]) -> Workflow {
        let mut wf = Workflow::new("graph");
        for id in nodes {
            wf.nodes.push(NodeSpec::new(*id, "test"));
        }
        for (from, to) in edges {
            wf.connections.push(Connection::new(*from, *to));
        }
        wf
    }

    #[test]
    fn lookups_follow_declaration_order() {
        let wf = workflow(&["a", "b", "c", "d"], &[("a", "c"), ("a", "b"), ("b", "d"), ("c", "d")]);
        let graph = WorkflowGraph::build(&wf);

        assert_eq!(graph.starting_nodes(), vec!["a"]);
        assert_eq!(graph.dependents("a"), vec!["c", "b"]);
        assert_eq!(graph.dependencies("d"), vec!["b", "c"]);
        assert!(graph.dependencies("a").is_empty());
        assert!(graph.dependents("unknown").is_empty());
    }

    #[test]
    fn finds_cycle_path() {
        let wf = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "b")]);
        let cycle = WorkflowGraph::build(&wf).find_cycle().unwrap();
        assert_eq!(cycle, vec!["b", "c", "b"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let wf = workflow(&["a", "b", "c", "d"], &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        assert!(WorkflowGraph::build(&wf).find_cycle().is_none());
    }

    #[test]
    fn reachability_ignores_nodes_only_reachable_inside_cycles() {
        let wf = workflow(&["a", "b", "x", "y"], &[("a", "b"), ("x", "y"), ("y", "x")]);
        let graph = WorkflowGraph::build(&wf);
        let reachable = graph.reachable_from_starts();
        assert!(reachable.contains("a") && reachable.contains("b"));
        assert!(!reachable.contains("x") && !reachable.contains("y"));
    }

    #[test]
    fn connections_to_unknown_nodes_are_skipped() {
        let wf = workflow(&["a"], &[("a", "ghost")]);
        let graph = WorkflowGraph::build(&wf);
        assert!(graph.dependents("a").is_empty());
        assert!(graph.is_isolated("a"));
        assert!(!graph.contains("ghost"));
    }
}
