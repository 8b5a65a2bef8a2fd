use crate::graph::{self, ValidationReport};
use crate::{NodeExecutor, NodeRegistry, RunReport, WorkflowRunner};
use relaycore::{
    EventBus, FlowError, RunEvent, RunId, RunOutcome, StatusChange, StatusObserver, Workflow,
    WorkflowError,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Composition root: owns the registry, the runner and the event bus
pub struct FlowRuntime {
    registry: Arc<NodeRegistry>,
    runner: WorkflowRunner,
    event_bus: Arc<EventBus>,
}

impl FlowRuntime {
    /// Create a runtime around a fully populated registry
    pub fn with_registry(registry: Arc<NodeRegistry>, config: RuntimeConfig) -> Self {
        let executor = NodeExecutor::new(registry.clone()).with_timeout(config.node_timeout());
        let runner = WorkflowRunner::new(executor).with_max_parallel(config.max_parallel_nodes);
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            runner,
            event_bus,
        }
    }

    /// Get access to the node registry, e.g. to build a node palette
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Run a workflow; `observer` and event bus subscribers both see every
    /// status transition.
    pub async fn run(&self, workflow: &Workflow, observer: &dyn StatusObserver) -> RunReport {
        self.run_with_cancellation(workflow, observer, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation(
        &self,
        workflow: &Workflow,
        observer: &dyn StatusObserver,
        cancel: CancellationToken,
    ) -> RunReport {
        let tee = Tee {
            first: observer,
            second: self.event_bus.as_ref(),
        };
        self.runner.run_with_cancellation(workflow, &tee, cancel).await
    }

    /// Check a workflow against the registry without running it
    pub fn validate(&self, workflow: &Workflow) -> Result<ValidationReport, WorkflowError> {
        graph::validate(workflow, &self.registry)
    }

    /// Subscribe to run events
    pub fn subscribe_events(&self) -> broadcast::Receiver<RunEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Forwards every callback to two observers
struct Tee<'a> {
    first: &'a dyn StatusObserver,
    second: &'a dyn StatusObserver,
}

impl StatusObserver for Tee<'_> {
    fn on_status_change(&self, change: &StatusChange) {
        self.first.on_status_change(change);
        self.second.on_status_change(change);
    }

    fn on_run_started(&self, run_id: RunId, workflow: &str) {
        self.first.on_run_started(run_id, workflow);
        self.second.on_run_started(run_id, workflow);
    }

    fn on_run_finished(&self, run_id: RunId, outcome: &RunOutcome) {
        self.first.on_run_finished(run_id, outcome);
        self.second.on_run_finished(run_id, outcome);
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on concurrently executing nodes; `None` means unbounded
    pub max_parallel_nodes: Option<usize>,
    /// Per-node execution limit in milliseconds; `None` leaves timeouts to
    /// the nodes themselves
    pub node_timeout_ms: Option<u64>,
    pub event_buffer_size: usize,
}

impl RuntimeConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: None,
            node_timeout_ms: None,
            event_buffer_size: 1000,
        }
    }
}
