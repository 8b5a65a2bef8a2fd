use crate::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type RunId = Uuid;

/// Run-time status of one node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Completed | NodeStatus::Failed)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A single node status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub run_id: RunId,
    pub node_id: NodeId,
    pub status: NodeStatus,
    /// Failure message, only set for `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Nothing left that could run; unreached branches stay pending.
    Finished,
    /// The caller cancelled the run before it finished.
    Cancelled,
    /// Pending nodes are waiting on each other or on connectors that can
    /// never deliver.
    Stalled {
        cycles: Vec<Vec<NodeId>>,
        blocked: Vec<NodeId>,
    },
}

/// Receives node status transitions while a run is in progress.
///
/// Calls arrive from the scheduler's single update path, so they are
/// ordered per run. Any `Fn(&StatusChange)` closure is an observer.
pub trait StatusObserver: Send + Sync {
    fn on_status_change(&self, change: &StatusChange);

    fn on_run_started(&self, _run_id: RunId, _workflow: &str) {}

    fn on_run_finished(&self, _run_id: RunId, _outcome: &RunOutcome) {}
}

impl<F> StatusObserver for F
where
    F: Fn(&StatusChange) + Send + Sync,
{
    fn on_status_change(&self, change: &StatusChange) {
        self(change)
    }
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_status_change(&self, _change: &StatusChange) {}
}

/// Events broadcast during workflow runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        workflow: String,
        timestamp: DateTime<Utc>,
    },
    NodeStatusChanged {
        change: StatusChange,
        timestamp: DateTime<Utc>,
    },
    RunFinished {
        run_id: RunId,
        outcome: RunOutcome,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast fan-out of run events to any number of subscribers
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: RunEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}

impl StatusObserver for EventBus {
    fn on_status_change(&self, change: &StatusChange) {
        self.emit(RunEvent::NodeStatusChanged {
            change: change.clone(),
            timestamp: Utc::now(),
        });
    }

    fn on_run_started(&self, run_id: RunId, workflow: &str) {
        self.emit(RunEvent::RunStarted {
            run_id,
            workflow: workflow.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn on_run_finished(&self, run_id: RunId, outcome: &RunOutcome) {
        self.emit(RunEvent::RunFinished {
            run_id,
            outcome: outcome.clone(),
            timestamp: Utc::now(),
        });
    }
}
