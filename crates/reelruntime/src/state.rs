use crate::graph::WorkflowGraph;
use crate::retry::ErrorPolicy;
use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex};
use reelcore::{
    ErrorHandling, ExecutionContext, NodeContext, NodeError, NodeId, NodeStatus, PipelineRun,
    ProgressEvent, RunId, RunOptions, RunStatus, ValidationIssue, Value, Workflow,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of a run-level state change.
#[derive(Debug)]
pub(crate) struct Transition {
    pub event: ProgressEvent,
    /// The run held an execution slot that is now free.
    pub released_slot: bool,
}

impl Transition {
    fn new(event: ProgressEvent) -> Self {
        Self {
            event,
            released_slot: false,
        }
    }
}

/// A node taken off the schedule, ready to be invoked.
#[derive(Debug)]
pub(crate) struct NodeLaunch {
    pub node_type: String,
    pub ctx: NodeContext,
    pub event: ProgressEvent,
}

/// How a finished node invocation affected its run.
#[derive(Debug)]
pub(crate) enum Settlement {
    /// The run is no longer active; the outcome was dropped.
    Discarded,
    Completed(ProgressEvent),
    /// Failure recorded under the `continue` policy.
    Continued(ProgressEvent),
    /// Failure ended the run.
    Failed(Transition),
}

struct RunInner {
    run: PipelineRun,
    /// Nodes scheduled but not yet started, in scheduling order.
    scheduled: Vec<NodeId>,
    holds_slot: bool,
}

/// Shared state of one run.
///
/// `inner` is the source of truth. The `watch` channel only wakes the driver
/// and waiters; it is written while `inner` is locked so it never lags
/// behind a later transition.
pub(crate) struct RunState {
    pub id: RunId,
    pub workflow: Arc<Workflow>,
    pub graph: WorkflowGraph,
    pub policy: ErrorPolicy,
    pub cancellation: CancellationToken,
    /// Held while an event of this run is delivered. Reentrant so an
    /// observer may pause or cancel the run from its callback.
    pub publishing: ReentrantMutex<()>,
    inner: Mutex<RunInner>,
    status: watch::Sender<RunStatus>,
}

impl RunState {
    pub fn new(
        workflow: Workflow,
        data: Value,
        options: RunOptions,
        retry_base_delay: Duration,
        warnings: &[ValidationIssue],
    ) -> Self {
        let id = Uuid::new_v4();
        let graph = WorkflowGraph::build(&workflow);
        let policy = ErrorPolicy::new(&options, retry_base_delay);

        let mut context = ExecutionContext::new(data);
        for issue in warnings {
            context.push_warning(issue.node_id.clone(), issue.message.clone());
        }

        let run = PipelineRun {
            id,
            workflow_id: workflow.id.clone(),
            workflow_name: workflow.name.clone(),
            status: RunStatus::Pending,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            paused_at: None,
            resumed_at: None,
            ended_at: None,
            options,
            context,
            node_statuses: workflow
                .nodes
                .iter()
                .map(|n| (n.id.clone(), NodeStatus::Idle))
                .collect(),
            current_node: None,
        };

        let (status, _) = watch::channel(RunStatus::Pending);

        Self {
            id,
            workflow: Arc::new(workflow),
            graph,
            policy,
            cancellation: CancellationToken::new(),
            publishing: ReentrantMutex::new(()),
            inner: Mutex::new(RunInner {
                run,
                scheduled: Vec::new(),
                holds_slot: false,
            }),
            status,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.inner.lock().run.status
    }

    pub fn options(&self) -> RunOptions {
        self.inner.lock().run.options.clone()
    }

    pub fn snapshot(&self) -> PipelineRun {
        self.inner.lock().run.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.subscribe()
    }

    /// Propagate the current status to watchers.
    pub fn notify(&self) {
        let inner = self.inner.lock();
        self.status.send_replace(inner.run.status);
    }

    /// `pending → running`: takes the execution slot and schedules the
    /// starting nodes.
    pub fn begin(&self) -> Option<ProgressEvent> {
        let mut inner = self.inner.lock();
        if inner.run.status != RunStatus::Pending {
            return None;
        }

        inner.run.status = RunStatus::Running;
        inner.run.started_at = Some(Utc::now());
        inner.holds_slot = true;

        let starts = self.graph.starting_nodes();
        self.schedule(&mut inner, &starts);

        Some(self.event(&inner.run).with_message("Execution started"))
    }

    pub fn pause(&self) -> Option<ProgressEvent> {
        let mut inner = self.inner.lock();
        if inner.run.status != RunStatus::Running {
            return None;
        }

        inner.run.status = RunStatus::Paused;
        inner.run.paused_at = Some(Utc::now());
        let RunInner { run, scheduled, .. } = &mut *inner;
        for node_id in scheduled.iter() {
            if let Some(status) = run.node_statuses.get_mut(node_id) {
                if *status == NodeStatus::Idle {
                    *status = NodeStatus::Paused;
                }
            }
        }

        Some(self.event(&inner.run).with_message("Execution paused by user"))
    }

    pub fn resume(&self) -> Option<ProgressEvent> {
        let mut inner = self.inner.lock();
        if inner.run.status != RunStatus::Paused {
            return None;
        }

        inner.run.status = RunStatus::Running;
        inner.run.resumed_at = Some(Utc::now());
        for status in inner.run.node_statuses.values_mut() {
            if *status == NodeStatus::Paused {
                *status = NodeStatus::Idle;
            }
        }

        Some(self.event(&inner.run).with_message("Execution resumed"))
    }

    pub fn cancel(&self) -> Option<Transition> {
        let mut inner = self.inner.lock();
        if !inner.run.status.is_active() {
            return None;
        }

        let event = self
            .finish(&mut inner, RunStatus::Cancelled)
            .with_message("Execution cancelled by user");
        Some(self.release(&mut inner, event))
    }

    /// `running → completed` once the driver has nothing left to start.
    pub fn complete(&self) -> Option<Transition> {
        let mut inner = self.inner.lock();
        if inner.run.status != RunStatus::Running {
            return None;
        }

        let RunInner { run, .. } = &mut *inner;
        for node in &self.workflow.nodes {
            if run.node_statuses.get(&node.id) == Some(&NodeStatus::Idle) {
                run.context.push_warning(
                    Some(node.id.clone()),
                    format!("Node {} was not executed", node.name),
                );
            }
        }

        inner.run.progress = 100;
        let event = self
            .finish(&mut inner, RunStatus::Completed)
            .with_message("Workflow execution completed successfully");
        Some(self.release(&mut inner, event))
    }

    /// Take up to `limit` scheduled nodes whose dependencies have completed and
    /// mark them running. Sequential runs take the most recently scheduled
    /// ready node first; parallel runs take them in scheduling order.
    pub fn take_ready(&self, limit: usize) -> Vec<NodeLaunch> {
        let mut inner = self.inner.lock();
        if inner.run.status != RunStatus::Running || limit == 0 {
            return Vec::new();
        }

        let candidates: Vec<NodeId> = if inner.run.options.parallel_execution {
            inner.scheduled.clone()
        } else {
            inner.scheduled.iter().rev().cloned().collect()
        };

        let mut launches = Vec::new();
        for node_id in candidates {
            if launches.len() >= limit {
                break;
            }
            if !self.is_ready(&inner.run, &node_id) {
                continue;
            }
            let Some(node) = self.workflow.find_node(&node_id) else {
                continue;
            };

            inner.scheduled.retain(|id| *id != node_id);
            inner
                .run
                .node_statuses
                .insert(node_id.clone(), NodeStatus::Running);
            inner.run.current_node = Some(node_id.clone());

            let mut ctx = NodeContext::new(self.id, node_id.clone());
            ctx.node_name = node.name.clone();
            ctx.data = inner.run.context.data.clone();
            ctx.results = inner.run.context.results.clone();
            ctx.config = node.configuration.clone();
            ctx.cancellation = self.cancellation.clone();

            let event = self
                .event(&inner.run)
                .with_message(format!("Executing: {}", node.name))
                .with_node(node_id.clone());

            launches.push(NodeLaunch {
                node_type: node.node_type.clone(),
                ctx,
                event,
            });
        }

        launches
    }

    /// Apply the final outcome of a node invocation.
    pub fn settle(&self, node_id: &str, outcome: Result<Value, NodeError>) -> Settlement {
        let mut inner = self.inner.lock();
        if !inner.run.status.is_active() {
            return Settlement::Discarded;
        }

        let name = self.node_name(node_id);
        match outcome {
            Ok(value) => {
                inner.run.context.results.insert(node_id.to_string(), value);
                inner
                    .run
                    .node_statuses
                    .insert(node_id.to_string(), NodeStatus::Completed);
                self.update_progress(&mut inner.run);

                let dependents = self.graph.dependents(node_id);
                self.schedule(&mut inner, &dependents);

                Settlement::Completed(
                    self.event(&inner.run)
                        .with_message(format!("Completed: {}", name))
                        .with_node(node_id),
                )
            }
            Err(err) => {
                let message = err.to_string();
                inner
                    .run
                    .node_statuses
                    .insert(node_id.to_string(), NodeStatus::Failed);
                inner.run.context.push_error(
                    Some(node_id.to_string()),
                    Some(name.clone()),
                    message.clone(),
                );

                if self.policy.handling == ErrorHandling::Continue {
                    inner.run.context.push_warning(
                        Some(node_id.to_string()),
                        format!("Node {} failed, continuing: {}", name, message),
                    );
                    return Settlement::Continued(
                        self.event(&inner.run)
                            .with_message(format!("Node {} failed, continuing", name))
                            .with_node(node_id)
                            .with_error(message),
                    );
                }

                inner.run.current_node = Some(node_id.to_string());
                let event = self
                    .finish(&mut inner, RunStatus::Failed)
                    .with_message(format!("Execution failed at node: {}", name))
                    .with_node(node_id)
                    .with_error(message);
                Settlement::Failed(self.release(&mut inner, event))
            }
        }
    }

    /// Record a warning while the run is still active.
    pub fn record_warning(&self, node_id: &str, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        if inner.run.status.is_active() {
            inner
                .run
                .context
                .push_warning(Some(node_id.to_string()), message);
        }
    }

    /// Put nodes on the schedule. Nodes that already ran are skipped; a node
    /// that is already scheduled moves to the back.
    fn schedule(&self, inner: &mut RunInner, nodes: &[NodeId]) {
        let sequential = !inner.run.options.parallel_execution;
        let paused = inner.run.status == RunStatus::Paused;

        // Sequential runs pop from the back, so push in reverse to keep the
        // first listed node first.
        let ordered: Vec<&NodeId> = if sequential {
            nodes.iter().rev().collect()
        } else {
            nodes.iter().collect()
        };

        for node_id in ordered {
            let Some(status) = inner.run.node_statuses.get_mut(node_id) else {
                continue;
            };
            if !status.is_waiting() {
                continue;
            }
            if paused {
                *status = NodeStatus::Paused;
            }
            inner.scheduled.retain(|id| id != node_id);
            inner.scheduled.push(node_id.clone());
        }
    }

    fn is_ready(&self, run: &PipelineRun, node_id: &str) -> bool {
        let waiting = run
            .node_statuses
            .get(node_id)
            .is_some_and(|s| s.is_waiting());
        waiting
            && self.graph.dependencies(node_id).iter().all(|dep| {
                run.node_statuses
                    .get(dep)
                    .is_some_and(|s| *s == NodeStatus::Completed)
            })
    }

    /// Completed share of the nodes, held below 100 until the run completes.
    fn update_progress(&self, run: &mut PipelineRun) {
        let total = self.graph.len().max(1);
        let completed = run.completed_nodes();
        let percent = ((completed * 100 + total / 2) / total).min(99) as u8;
        run.progress = run.progress.max(percent);
    }

    fn finish(&self, inner: &mut RunInner, status: RunStatus) -> ProgressEvent {
        inner.run.status = status;
        inner.run.ended_at = Some(Utc::now());
        inner.scheduled.clear();
        if status != RunStatus::Failed {
            inner.run.current_node = None;
        }
        for node_status in inner.run.node_statuses.values_mut() {
            if *node_status == NodeStatus::Paused {
                *node_status = NodeStatus::Idle;
            }
        }
        self.cancellation.cancel();
        self.event(&inner.run)
    }

    fn release(&self, inner: &mut RunInner, event: ProgressEvent) -> Transition {
        let mut transition = Transition::new(event);
        transition.released_slot = std::mem::take(&mut inner.holds_slot);
        transition
    }

    fn event(&self, run: &PipelineRun) -> ProgressEvent {
        ProgressEvent::new(self.id, run.status, run.progress)
    }

    fn node_name(&self, node_id: &str) -> String {
        self.workflow
            .find_node(node_id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| node_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcore::{Connection, NodeSpec, StartOptions, WorkflowConfig};

    fn run_state(edges: &[(&str, &str)], nodes: &[&str], options: StartOptions) -> RunState {
        let mut wf = Workflow::new("state");
        for id in nodes {
            wf.nodes.push(NodeSpec::new(*id, "test"));
        }
        for (from, to) in edges {
            wf.connections.push(Connection::new(*from, *to));
        }
        let options = RunOptions::resolve(&WorkflowConfig::default(), &options);
        RunState::new(wf, Value::object(), options, Duration::from_millis(1), &[])
    }

    fn ids(launches: &[NodeLaunch]) -> Vec<&str> {
        launches.iter().map(|l| l.ctx.node_id.as_str()).collect()
    }

    #[test]
    fn sequential_order_is_depth_first() {
        let state = run_state(
            &[("a", "b"), ("a", "c"), ("b", "d")],
            &["a", "b", "c", "d"],
            StartOptions::default().sequential(),
        );
        state.begin().unwrap();

        let mut order = Vec::new();
        loop {
            let launches = state.take_ready(1);
            let Some(launch) = launches.into_iter().next() else {
                break;
            };
            let id = launch.ctx.node_id.clone();
            assert!(matches!(
                state.settle(&id, Ok(Value::Null)),
                Settlement::Completed(_)
            ));
            order.push(id);
        }

        assert_eq!(order, vec!["a", "b", "d", "c"]);
        let done = state.complete().unwrap();
        assert!(done.released_slot);
        assert_eq!(done.event.progress, 100);
    }

    #[test]
    fn join_waits_for_every_dependency() {
        let state = run_state(
            &[("a", "c"), ("b", "c")],
            &["a", "b", "c"],
            StartOptions::default().parallel(),
        );
        state.begin().unwrap();
        assert_eq!(ids(&state.take_ready(10)), vec!["a", "b"]);

        state.settle("a", Ok(Value::Null));
        assert!(state.take_ready(10).is_empty());

        state.settle("b", Ok(Value::Null));
        let launches = state.take_ready(10);
        assert_eq!(ids(&launches), vec!["c"]);
        assert_eq!(launches[0].ctx.results.len(), 2);
    }

    #[test]
    fn progress_stays_below_100_until_completion() {
        let state = run_state(&[], &["only"], StartOptions::default());
        state.begin().unwrap();
        state.take_ready(1);
        match state.settle("only", Ok(Value::Null)) {
            Settlement::Completed(event) => assert_eq!(event.progress, 99),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state.complete().unwrap().event.progress, 100);
    }

    #[test]
    fn paused_runs_hold_scheduled_nodes() {
        let state = run_state(&[("a", "b")], &["a", "b"], StartOptions::default());
        state.begin().unwrap();
        state.take_ready(10);
        state.pause().unwrap();

        // In-flight result still lands while paused.
        state.settle("a", Ok(Value::from("done")));
        assert!(state.take_ready(10).is_empty());
        let snapshot = state.snapshot();
        assert_eq!(snapshot.node_statuses["b"], NodeStatus::Paused);
        assert!(snapshot.context.results.contains_key("a"));

        state.resume().unwrap();
        assert_eq!(ids(&state.take_ready(10)), vec!["b"]);
    }

    #[test]
    fn late_results_are_discarded_after_cancel() {
        let state = run_state(&[], &["a"], StartOptions::default());
        state.begin().unwrap();
        state.take_ready(1);

        let cancelled = state.cancel().unwrap();
        assert!(cancelled.released_slot);
        assert!(state.cancellation.is_cancelled());
        assert!(state.cancel().is_none());

        assert!(matches!(
            state.settle("a", Ok(Value::Null)),
            Settlement::Discarded
        ));
        assert!(state.snapshot().context.results.is_empty());
    }

    #[test]
    fn stop_policy_fails_the_run() {
        let state = run_state(&[("a", "b")], &["a", "b"], StartOptions::default());
        state.begin().unwrap();
        state.take_ready(1);

        match state.settle("a", Err(NodeError::failed("boom"))) {
            Settlement::Failed(transition) => {
                assert!(transition.released_slot);
                assert_eq!(transition.event.status, RunStatus::Failed);
                assert_eq!(transition.event.current_node_id.as_deref(), Some("a"));
            }
            other => panic!("unexpected {:?}", other),
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.context.errors.len(), 1);
        assert_eq!(snapshot.node_statuses["b"], NodeStatus::Idle);
    }

    #[test]
    fn continue_policy_does_not_schedule_dependents() {
        let state = run_state(
            &[("a", "b")],
            &["a", "b", "c"],
            StartOptions::default().with_error_handling(ErrorHandling::Continue),
        );
        state.begin().unwrap();
        assert_eq!(ids(&state.take_ready(10)), vec!["a", "c"]);

        assert!(matches!(
            state.settle("a", Err(NodeError::failed("boom"))),
            Settlement::Continued(_)
        ));
        state.settle("c", Ok(Value::Null));
        assert!(state.take_ready(10).is_empty());

        state.complete().unwrap();
        let snapshot = state.snapshot();
        assert_eq!(snapshot.status, RunStatus::Completed);
        assert!(snapshot
            .context
            .warnings
            .iter()
            .any(|w| w.node_id.as_deref() == Some("b")));
    }

    #[test]
    fn join_stays_blocked_by_failed_dependency() {
        let state = run_state(
            &[("a", "c"), ("b", "c")],
            &["a", "b", "c"],
            StartOptions::default().with_error_handling(ErrorHandling::Continue),
        );
        state.begin().unwrap();
        assert_eq!(ids(&state.take_ready(10)), vec!["a", "b"]);

        state.settle("b", Ok(Value::Null));
        state.settle("a", Err(NodeError::failed("boom")));
        assert!(state.take_ready(10).is_empty());
        assert_eq!(state.snapshot().node_statuses["c"], NodeStatus::Idle);
    }
}
