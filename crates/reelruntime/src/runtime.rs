use crate::executor::RunExecutor;
use crate::registry::ProcessorRegistry;
use crate::state::{RunState, Transition};
use crate::validator;
use parking_lot::Mutex;
use reelcore::{
    IssueCode, NodeContext, NodeError, PipelineError, PipelineRun, Processor, ProgressEvent,
    ProgressObserver, ProgressPublisher, RunId, RunOptions, StartOptions, ValidationIssue,
    ValidationReport, Value, Workflow,
};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Runs allowed to be running or paused at once; further starts queue.
    pub max_concurrent_runs: usize,
    /// Node invocations in flight per parallel run.
    pub max_parallel_nodes: usize,
    /// Base of the exponential retry backoff.
    pub retry_base_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 3,
            max_parallel_nodes: 10,
            retry_base_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Default)]
struct Admission {
    active: usize,
    queue: VecDeque<RunId>,
}

/// State behind every [`Orchestrator`] handle.
///
/// Lock order: `admission` before `runs`; a run's own lock is never held
/// while taking either.
pub(crate) struct Shared {
    pub config: RuntimeConfig,
    pub registry: Arc<ProcessorRegistry>,
    pub publisher: ProgressPublisher,
    runs: Mutex<HashMap<RunId, Arc<RunState>>>,
    admission: Mutex<Admission>,
}

impl Shared {
    fn run(&self, run_id: RunId) -> Option<Arc<RunState>> {
        self.runs.lock().get(&run_id).cloned()
    }

    /// Publish a terminal transition and hand its slot to the next queued run.
    pub fn finish(self: &Arc<Self>, run: &RunState, transition: Transition) {
        self.publish(run, transition.event);
        run.notify();
        if transition.released_slot {
            self.release_slot();
        }
    }

    /// Deliver an event for `run`. Once the run is terminal only its
    /// terminal event gets through, so observers never see a stale status
    /// after the final one.
    pub fn publish(&self, run: &RunState, event: ProgressEvent) {
        let _order = run.publishing.lock();
        if !event.status.is_terminal() && run.status().is_terminal() {
            tracing::debug!(
                run_id = %run.id,
                status = %event.status,
                "Suppressing event of finished run"
            );
            return;
        }
        self.publisher.publish(event);
    }

    fn admit(self: &Arc<Self>, run: Arc<RunState>) {
        let admitted = {
            let mut admission = self.admission.lock();
            if admission.active < self.config.max_concurrent_runs {
                admission.active += 1;
                true
            } else {
                admission.queue.push_back(run.id);
                tracing::debug!(
                    run_id = %run.id,
                    queued = admission.queue.len(),
                    "All execution slots busy, queueing run"
                );
                false
            }
        };

        if admitted {
            self.launch(run);
        }
    }

    fn release_slot(self: &Arc<Self>) {
        let next = {
            let mut admission = self.admission.lock();
            admission.active = admission.active.saturating_sub(1);

            let mut next = None;
            while let Some(run_id) = admission.queue.pop_front() {
                if let Some(run) = self.run(run_id) {
                    admission.active += 1;
                    next = Some(run);
                    break;
                }
            }
            next
        };

        if let Some(run) = next {
            tracing::debug!(run_id = %run.id, "Promoting queued run");
            self.launch(run);
        }
    }

    fn launch(self: &Arc<Self>, run: Arc<RunState>) {
        match run.begin() {
            Some(event) => {
                self.publish(&run, event);
                run.notify();
                tokio::spawn(RunExecutor::new(self.clone(), run).drive());
            }
            None => self.release_slot(),
        }
    }
}

/// Run controller: validates workflows, admits runs under the concurrency
/// bound and exposes pause/resume/cancel and status queries.
///
/// Cheap to clone; clones share all state. Must be used from within a Tokio
/// runtime.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    /// Create a new orchestrator with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(ProcessorRegistry::new()), config)
    }

    /// Create a new orchestrator with a pre-populated registry
    pub fn with_registry(registry: Arc<ProcessorRegistry>, mut config: RuntimeConfig) -> Self {
        config.max_concurrent_runs = config.max_concurrent_runs.max(1);
        config.max_parallel_nodes = config.max_parallel_nodes.max(1);
        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                publisher: ProgressPublisher::new(),
                runs: Mutex::new(HashMap::new()),
                admission: Mutex::new(Admission::default()),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ProcessorRegistry> {
        &self.shared.registry
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    pub fn register_processor(&self, node_type: impl Into<String>, processor: Arc<dyn Processor>) {
        self.shared.registry.register(node_type, processor);
    }

    pub fn register_fn<F, Fut>(&self, node_type: impl Into<String>, func: F)
    where
        F: Fn(NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, NodeError>> + Send + 'static,
    {
        self.shared.registry.register_fn(node_type, func);
    }

    /// Structural validation plus checks against the registered processors.
    pub fn validate(&self, workflow: &Workflow) -> ValidationReport {
        let mut report = validator::validate(workflow);

        for node in &workflow.nodes {
            match self.shared.registry.get(&node.node_type) {
                Some(processor) => {
                    if let Err(err) = processor.validate_config(&node.configuration) {
                        report.error(
                            ValidationIssue::new(
                                IssueCode::InvalidNodeConfig,
                                format!("Node {} has invalid configuration: {}", node.name, err),
                            )
                            .for_node(&node.id),
                        );
                    }
                }
                None => report.warning(
                    ValidationIssue::new(
                        IssueCode::UnknownNodeType,
                        format!(
                            "Node {} uses unregistered type {}",
                            node.name, node.node_type
                        ),
                    )
                    .for_node(&node.id),
                ),
            }
        }

        report
    }

    /// Validate `workflow` and create a run for it.
    ///
    /// The run starts immediately when an execution slot is free and is
    /// queued as `pending` otherwise. An invalid workflow creates no run.
    pub async fn start(
        &self,
        workflow: &Workflow,
        data: Value,
        options: StartOptions,
    ) -> reelcore::Result<RunId> {
        self.create_run(workflow, data, options, None)
    }

    /// Like [`start`](Self::start), with `observer` attached before the run
    /// is admitted so it also sees "Execution started".
    pub async fn start_monitored<F>(
        &self,
        workflow: &Workflow,
        data: Value,
        options: StartOptions,
        observer: F,
    ) -> reelcore::Result<RunId>
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.create_run(workflow, data, options, Some(Arc::new(observer)))
    }

    fn create_run(
        &self,
        workflow: &Workflow,
        data: Value,
        options: StartOptions,
        observer: Option<ProgressObserver>,
    ) -> reelcore::Result<RunId> {
        let report = self.validate(workflow);
        if !report.is_valid() {
            tracing::error!(
                workflow = %workflow.name,
                "Workflow validation failed: {}",
                report.summary()
            );
            return Err(PipelineError::Validation(report));
        }

        let options = RunOptions::resolve(&workflow.configuration, &options);
        let run = Arc::new(RunState::new(
            workflow.clone(),
            data,
            options,
            self.shared.config.retry_base_delay,
            &report.warnings,
        ));
        let run_id = run.id;

        tracing::info!(run_id = %run_id, workflow = %workflow.name, "Created pipeline run");
        if let Some(observer) = observer {
            self.shared.publisher.monitor(run_id, observer);
        }
        self.shared.runs.lock().insert(run_id, run.clone());
        self.shared.admit(run);

        Ok(run_id)
    }

    /// Pause a running run. In-flight nodes finish; nothing new starts.
    pub fn pause(&self, run_id: RunId) -> bool {
        let Some(run) = self.shared.run(run_id) else {
            return false;
        };
        match run.pause() {
            Some(event) => {
                tracing::info!(run_id = %run_id, "Run paused");
                self.shared.publish(&run, event);
                run.notify();
                true
            }
            None => false,
        }
    }

    pub fn resume(&self, run_id: RunId) -> bool {
        let Some(run) = self.shared.run(run_id) else {
            return false;
        };
        match run.resume() {
            Some(event) => {
                tracing::info!(run_id = %run_id, "Run resumed");
                self.shared.publish(&run, event);
                run.notify();
                true
            }
            None => false,
        }
    }

    /// Cancel a running or paused run and free its slot.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let Some(run) = self.shared.run(run_id) else {
            return false;
        };
        match run.cancel() {
            Some(transition) => {
                tracing::info!(run_id = %run_id, "Run cancelled");
                self.shared.finish(&run, transition);
                true
            }
            None => false,
        }
    }

    pub fn get_status(&self, run_id: RunId) -> Option<PipelineRun> {
        self.shared.run(run_id).map(|run| run.snapshot())
    }

    /// Snapshots of every run, oldest first.
    pub fn get_all(&self) -> Vec<PipelineRun> {
        let runs: Vec<_> = self.shared.runs.lock().values().cloned().collect();
        let mut snapshots: Vec<_> = runs.iter().map(|run| run.snapshot()).collect();
        snapshots.sort_by_key(|run| run.created_at);
        snapshots
    }

    /// Route the run's progress events to `observer`, replacing any previous one.
    pub fn monitor_progress<F>(&self, run_id: RunId, observer: F)
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        self.shared.publisher.monitor(run_id, Arc::new(observer));
    }

    pub fn stop_monitoring(&self, run_id: RunId) -> bool {
        self.shared.publisher.stop(run_id)
    }

    /// Wait until the run is terminal and return its final snapshot.
    pub async fn wait(&self, run_id: RunId) -> reelcore::Result<PipelineRun> {
        let run = self
            .shared
            .run(run_id)
            .ok_or(PipelineError::RunNotFound(run_id))?;

        let mut status_rx = run.subscribe();
        // The sender lives as long as `run`, so this only returns once terminal.
        let _ = status_rx.wait_for(|status| status.is_terminal()).await;

        Ok(run.snapshot())
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelcore::{NodeSpec, RunStatus};

    #[tokio::test]
    async fn stale_events_after_cancel_are_dropped() {
        let orchestrator = Orchestrator::new();
        orchestrator.register_fn("wait", |ctx: NodeContext| async move {
            ctx.cancellation.cancelled().await;
            Err::<Value, _>(NodeError::Cancelled)
        });

        let mut wf = Workflow::new("stale");
        wf.add_node(NodeSpec::new("a", "wait")).unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let run_id = orchestrator
            .start_monitored(&wf, Value::object(), StartOptions::default(), move |event| {
                sink.lock().push(event)
            })
            .await
            .unwrap();
        assert!(orchestrator.cancel(run_id));

        // An event built while the run was still running, delivered late.
        let run = orchestrator.shared.run(run_id).unwrap();
        let late = ProgressEvent::new(run_id, RunStatus::Running, 0).with_message("Executing: a");
        orchestrator.shared.publish(&run, late);

        let events = events.lock();
        let last = events.last().unwrap();
        assert_eq!(last.status, RunStatus::Cancelled);
        assert!(events
            .iter()
            .skip_while(|e| e.status != RunStatus::Cancelled)
            .all(|e| e.status == RunStatus::Cancelled));
    }
}
