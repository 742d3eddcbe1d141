use crate::{NodeId, RunId, RunStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Status update delivered to a run's observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub run_id: RunId,
    pub status: RunStatus,
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(run_id: RunId, status: RunStatus, progress: u8) -> Self {
        Self {
            run_id,
            status,
            progress,
            message: None,
            current_node_id: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.current_node_id = Some(node_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

pub type ProgressObserver = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// One observer slot per run.
///
/// Registering replaces the previous observer for that run. Nothing is
/// buffered: events published before an observer is registered are lost.
#[derive(Default)]
pub struct ProgressPublisher {
    observers: Mutex<HashMap<RunId, ProgressObserver>>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn monitor(&self, run_id: RunId, observer: ProgressObserver) {
        self.observers.lock().insert(run_id, observer);
    }

    pub fn stop(&self, run_id: RunId) -> bool {
        self.observers.lock().remove(&run_id).is_some()
    }

    pub fn is_monitored(&self, run_id: RunId) -> bool {
        self.observers.lock().contains_key(&run_id)
    }

    /// Invoke the run's observer, if any, on the calling task.
    pub fn publish(&self, event: ProgressEvent) {
        // Clone out of the lock so an observer may re-register or publish.
        let observer = self.observers.lock().get(&event.run_id).cloned();
        match observer {
            Some(observer) => observer(event),
            None => tracing::trace!(run_id = %event.run_id, status = %event.status, "no progress observer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn recorder() -> (Arc<Mutex<Vec<ProgressEvent>>>, ProgressObserver) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, Arc::new(move |event: ProgressEvent| sink.lock().push(event)))
    }

    #[test]
    fn only_the_latest_observer_is_called() {
        let publisher = ProgressPublisher::new();
        let run_id = Uuid::new_v4();
        let (first, first_observer) = recorder();
        let (second, second_observer) = recorder();

        publisher.monitor(run_id, first_observer);
        publisher.publish(ProgressEvent::new(run_id, RunStatus::Running, 10));
        publisher.monitor(run_id, second_observer);
        publisher.publish(ProgressEvent::new(run_id, RunStatus::Running, 20).with_node("b"));

        assert_eq!(first.lock().len(), 1);
        let second = second.lock();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].progress, 20);
        assert_eq!(second[0].current_node_id.as_deref(), Some("b"));
    }

    #[test]
    fn events_are_not_buffered() {
        let publisher = ProgressPublisher::new();
        let run_id = Uuid::new_v4();
        publisher.publish(ProgressEvent::new(run_id, RunStatus::Running, 0));

        let (seen, observer) = recorder();
        publisher.monitor(run_id, observer);
        assert!(seen.lock().is_empty());

        assert!(publisher.stop(run_id));
        publisher.publish(ProgressEvent::new(run_id, RunStatus::Completed, 100));
        assert!(seen.lock().is_empty());
        assert!(!publisher.is_monitored(run_id));
    }

    #[test]
    fn events_for_other_runs_are_ignored() {
        let publisher = ProgressPublisher::new();
        let (seen, observer) = recorder();
        publisher.monitor(Uuid::new_v4(), observer);
        publisher.publish(ProgressEvent::new(Uuid::new_v4(), RunStatus::Failed, 40));
        assert!(seen.lock().is_empty());
    }
}
