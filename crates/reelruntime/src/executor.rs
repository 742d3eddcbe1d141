use crate::registry::ProcessorRegistry;
use crate::retry::FailureAction;
use crate::runtime::Shared;
use crate::state::{NodeLaunch, RunState, Settlement};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use reelcore::{NodeContext, NodeError, NodeId, Processor, RunStatus, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;

type NodeOutcome = (NodeId, Result<Result<Value, NodeError>, JoinError>);

/// Drives one admitted run to a terminal state.
///
/// Each node invocation runs in its own task. The driver reacts to node
/// completions and to status changes of the run; dropping it detaches any
/// invocation still in flight.
pub(crate) struct RunExecutor {
    shared: Arc<Shared>,
    run: Arc<RunState>,
}

impl RunExecutor {
    pub fn new(shared: Arc<Shared>, run: Arc<RunState>) -> Self {
        Self { shared, run }
    }

    pub async fn drive(self) {
        let run_id = self.run.id;
        let mut status_rx = self.run.subscribe();
        let mut in_flight: FuturesUnordered<BoxFuture<'static, NodeOutcome>> =
            FuturesUnordered::new();

        let capacity = if self.run.options().parallel_execution {
            self.shared.config.max_parallel_nodes.max(1)
        } else {
            1
        };

        tracing::info!(
            run_id = %run_id,
            workflow = %self.run.workflow.name,
            nodes = self.run.graph.len(),
            "Starting workflow execution"
        );

        loop {
            status_rx.borrow_and_update();
            let status = self.run.status();
            if status.is_terminal() {
                break;
            }

            if status == RunStatus::Running {
                let free = capacity.saturating_sub(in_flight.len());
                for launch in self.run.take_ready(free) {
                    in_flight.push(self.launch(launch));
                }
            }

            if in_flight.is_empty() {
                if status == RunStatus::Running {
                    if let Some(transition) = self.run.complete() {
                        tracing::info!(run_id = %run_id, "Workflow execution completed");
                        self.shared.finish(&self.run, transition);
                        break;
                    }
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }

            tokio::select! {
                Some((node_id, outcome)) = in_flight.next() => {
                    self.settle(&node_id, outcome);
                }
                changed = status_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            tracing::debug!(
                run_id = %run_id,
                detached = in_flight.len(),
                "Run ended with node invocations still in flight"
            );
        }
    }

    fn launch(&self, launch: NodeLaunch) -> BoxFuture<'static, NodeOutcome> {
        let NodeLaunch {
            node_type,
            ctx,
            event,
        } = launch;

        tracing::info!(
            run_id = %self.run.id,
            node_id = %ctx.node_id,
            node_type = %node_type,
            "Executing node"
        );
        self.shared.publish(&self.run, event);

        let node_id = ctx.node_id.clone();
        let handle = tokio::spawn(invoke(
            self.shared.registry.clone(),
            self.run.clone(),
            node_type,
            ctx,
        ));
        async move { (node_id, handle.await) }.boxed()
    }

    fn settle(&self, node_id: &str, outcome: Result<Result<Value, NodeError>, JoinError>) {
        let outcome = outcome.unwrap_or_else(|e| {
            Err(NodeError::failed(format!("node task panicked: {}", e)))
        });

        match self.run.settle(node_id, outcome) {
            Settlement::Discarded => {
                tracing::debug!(run_id = %self.run.id, node_id, "Discarding result of inactive run");
            }
            Settlement::Completed(event) => {
                self.shared.publish(&self.run, event);
            }
            Settlement::Continued(event) => {
                tracing::warn!(
                    run_id = %self.run.id,
                    node_id,
                    error = event.error.as_deref().unwrap_or_default(),
                    "Node failed, continuing"
                );
                self.shared.publish(&self.run, event);
            }
            Settlement::Failed(transition) => {
                tracing::error!(
                    run_id = %self.run.id,
                    node_id,
                    error = transition.event.error.as_deref().unwrap_or_default(),
                    "Workflow execution failed"
                );
                self.shared.finish(&self.run, transition);
            }
        }
    }
}

/// Invoke a node's processor, retrying per the run's policy.
async fn invoke(
    registry: Arc<ProcessorRegistry>,
    run: Arc<RunState>,
    node_type: String,
    mut ctx: NodeContext,
) -> Result<Value, NodeError> {
    let timeout = run.options().timeout();

    loop {
        let start = Instant::now();
        let result = match registry.get(&node_type) {
            Some(processor) => call(processor, ctx.clone(), timeout).await,
            None => Err(NodeError::NoProcessor(node_type.clone())),
        };

        let err = match result {
            Ok(value) => {
                tracing::info!(
                    node_id = %ctx.node_id,
                    "Node completed in {}ms",
                    start.elapsed().as_millis()
                );
                return Ok(value);
            }
            Err(err) => err,
        };
        tracing::error!(node_id = %ctx.node_id, attempt = ctx.attempt, "Node failed: {}", err);

        match run.policy.decide(ctx.attempt) {
            FailureAction::Retry { delay } => {
                tracing::warn!(
                    node_id = %ctx.node_id,
                    attempt = ctx.attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying node"
                );
                run.record_warning(
                    &ctx.node_id,
                    format!(
                        "Node {} attempt {} failed, retrying in {}ms: {}",
                        ctx.node_name,
                        ctx.attempt + 1,
                        delay.as_millis(),
                        err
                    ),
                );

                tokio::select! {
                    _ = ctx.cancellation.cancelled() => return Err(NodeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                ctx.attempt += 1;
            }
            FailureAction::Exhausted => return Err(NodeError::RetriesExhausted(Box::new(err))),
            FailureAction::Stop | FailureAction::Continue => return Err(err),
        }
    }
}

async fn call(
    processor: Arc<dyn Processor>,
    ctx: NodeContext,
    timeout: Option<Duration>,
) -> Result<Value, NodeError> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, processor.process(ctx)).await {
            Ok(result) => result,
            Err(_) => Err(NodeError::Timeout {
                ms: limit.as_millis() as u64,
            }),
        },
        None => processor.process(ctx).await,
    }
}
