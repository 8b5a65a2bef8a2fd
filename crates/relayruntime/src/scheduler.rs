use crate::executor::{NodeExecutor, NodeResult};
use crate::graph::{cycles_among, ConnectorIndex};
use futures::stream::{FuturesUnordered, StreamExt};
use relaycore::{
    NodeError, NodeId, NodeOutputs, NodeStatus, RunId, RunOutcome, StatusChange, StatusObserver,
    Value, Workflow, WorkflowError, WorkflowNode,
};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Drives workflows to completion in data-flow order.
///
/// A node runs once every declared input port holds a value delivered by a
/// completed upstream node. Ports left `NotTaken` never deliver, which is
/// how success/fail branching prunes the graph.
#[derive(Clone)]
pub struct WorkflowRunner {
    executor: NodeExecutor,
    max_parallel: Option<usize>,
}

impl WorkflowRunner {
    pub fn new(executor: NodeExecutor) -> Self {
        Self {
            executor,
            max_parallel: None,
        }
    }

    /// Cap the number of nodes executing at once
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel.filter(|limit| *limit > 0);
        self
    }

    pub fn executor(&self) -> &NodeExecutor {
        &self.executor
    }

    /// Run `workflow`, reporting every status transition to `observer`
    pub async fn run(&self, workflow: &Workflow, observer: &dyn StatusObserver) -> RunReport {
        self.run_with_cancellation(workflow, observer, CancellationToken::new())
            .await
    }

    /// Run `workflow` until it finishes or `cancel` fires.
    ///
    /// After cancellation no further node is started; nodes already running
    /// observe the same token through their execution context and are
    /// awaited before this returns.
    pub async fn run_with_cancellation(
        &self,
        workflow: &Workflow,
        observer: &dyn StatusObserver,
        cancel: CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        observer.on_run_started(run_id, &workflow.name);
        tracing::info!("Starting run {} of workflow '{}'", run_id, workflow.name);

        let index = ConnectorIndex::build(workflow, self.executor.registry());
        for (connector, reason) in index.orphans() {
            tracing::warn!("Connector {} can never deliver: {}", connector.id, reason);
        }
        for (target, port) in index.fan_in() {
            tracing::warn!(
                "Input {}:{} has several incoming connectors; first value wins",
                target,
                port
            );
        }

        // Dropping the run future aborts in-flight nodes too.
        let node_token = cancel.child_token();
        let _abort_on_drop = node_token.clone().drop_guard();

        let mut state = RunState::new(run_id, workflow);
        let mut running = FuturesUnordered::new();
        let mut cancelled = false;

        loop {
            // The token may fire while a completion is being applied.
            if !cancelled && cancel.is_cancelled() {
                tracing::info!("Run {} cancelled; no further nodes start", run_id);
                cancelled = true;
            }
            if !cancelled {
                for node in state.ready_nodes(workflow, &index, &self.executor) {
                    if self.max_parallel.is_some_and(|limit| running.len() >= limit) {
                        break;
                    }

                    state.transition(&node.id, NodeStatus::Running, None, observer);
                    let inputs = state.take_inputs(&node.id);
                    let executor = self.executor.clone();
                    let node_id = node.id.clone();
                    let node = node.clone();
                    let token = node_token.clone();

                    let handle = tokio::spawn(async move {
                        let start = Instant::now();
                        let result = executor.execute(&node, inputs, token).await;
                        (result, start.elapsed())
                    });
                    running.push(async move { (node_id, handle.await) });
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    tracing::info!(
                        "Run {} cancelled; waiting for {} running nodes",
                        run_id,
                        running.len()
                    );
                    cancelled = true;
                }
                Some((node_id, joined)) = running.next() => {
                    let (result, elapsed): (NodeResult, Duration) = joined.unwrap_or_else(|e| {
                        (Err(NodeError::Panicked(e.to_string())), Duration::ZERO)
                    });
                    state.durations.insert(node_id.clone(), elapsed);
                    state.finish(&node_id, result, &index, observer);
                }
                else => break,
            }
        }

        let outcome = if cancelled {
            RunOutcome::Cancelled
        } else {
            state.classify_pending(workflow, &index, &self.executor)
        };
        match &outcome {
            RunOutcome::Stalled { cycles, blocked } => {
                tracing::error!(
                    "Run {} stalled: {} blocked nodes, cycles {:?}",
                    run_id,
                    blocked.len(),
                    cycles
                );
            }
            _ => tracing::info!(
                "Run {} finished in {:?}: {:?}",
                run_id,
                started.elapsed(),
                outcome
            ),
        }
        observer.on_run_finished(run_id, &outcome);

        state.into_report(workflow, outcome, started.elapsed())
    }
}

/// Per-run scheduler state. Only the run loop touches it.
struct RunState {
    run_id: RunId,
    statuses: HashMap<NodeId, NodeStatus>,
    resolved: HashMap<NodeId, HashMap<String, Value>>,
    outputs: HashMap<NodeId, NodeOutputs>,
    errors: HashMap<NodeId, String>,
    durations: HashMap<NodeId, Duration>,
}

impl RunState {
    fn new(run_id: RunId, workflow: &Workflow) -> Self {
        Self {
            run_id,
            statuses: workflow
                .nodes
                .iter()
                .map(|n| (n.id.clone(), NodeStatus::Pending))
                .collect(),
            resolved: HashMap::new(),
            outputs: HashMap::new(),
            errors: HashMap::new(),
            durations: HashMap::new(),
        }
    }

    fn status(&self, node_id: &str) -> NodeStatus {
        self.statuses
            .get(node_id)
            .copied()
            .unwrap_or(NodeStatus::Pending)
    }

    fn inputs_of(&self, node_id: &str) -> Option<&HashMap<String, Value>> {
        self.resolved.get(node_id)
    }

    fn take_inputs(&mut self, node_id: &str) -> HashMap<String, Value> {
        self.resolved.remove(node_id).unwrap_or_default()
    }

    /// Pending nodes whose inputs are all satisfied, in workflow order
    fn ready_nodes<'w>(
        &self,
        workflow: &'w Workflow,
        index: &ConnectorIndex<'_>,
        executor: &NodeExecutor,
    ) -> Vec<&'w WorkflowNode> {
        let empty = HashMap::new();
        workflow
            .nodes
            .iter()
            .filter(|node| self.status(&node.id) == NodeStatus::Pending)
            .filter(|node| {
                let inputs = self.inputs_of(&node.id).unwrap_or(&empty);
                if executor.registry().has(&node.node_type) {
                    executor.check_inputs(node, inputs)
                } else {
                    // Unknown types run as soon as whatever is wired into them
                    // arrives, so the executor can fail them.
                    index
                        .connected_ports(&node.id)
                        .iter()
                        .all(|port| inputs.contains_key(*port))
                }
            })
            .collect()
    }

    /// Move `node_id` forward and report it. Refuses to leave a terminal state.
    fn transition(
        &mut self,
        node_id: &str,
        status: NodeStatus,
        error: Option<String>,
        observer: &dyn StatusObserver,
    ) {
        let current = self.status(node_id);
        let allowed = matches!(
            (current, status),
            (NodeStatus::Pending, NodeStatus::Running)
                | (NodeStatus::Running, NodeStatus::Completed)
                | (NodeStatus::Running, NodeStatus::Failed)
        );
        if !allowed {
            tracing::error!("Ignoring transition of {} from {} to {}", node_id, current, status);
            return;
        }

        self.statuses.insert(node_id.to_string(), status);
        observer.on_status_change(&StatusChange {
            run_id: self.run_id,
            node_id: node_id.to_string(),
            status,
            error,
        });
    }

    /// Apply one node completion: report it and fan its taken outputs out
    /// to every downstream port in one step.
    fn finish(
        &mut self,
        node_id: &str,
        result: NodeResult,
        index: &ConnectorIndex<'_>,
        observer: &dyn StatusObserver,
    ) {
        match result {
            Ok(outputs) => {
                tracing::info!("Node {} completed", node_id);
                self.transition(node_id, NodeStatus::Completed, None, observer);

                for (port, value) in outputs.taken() {
                    for connector in index.outgoing(node_id, port) {
                        if self.status(&connector.target) != NodeStatus::Pending {
                            continue;
                        }
                        let slot = self.resolved.entry(connector.target.clone()).or_default();
                        if slot.contains_key(&connector.target_port) {
                            tracing::warn!(
                                "Dropping value from {}; {}:{} already has one",
                                connector.id,
                                connector.target,
                                connector.target_port
                            );
                            continue;
                        }
                        slot.insert(connector.target_port.clone(), value.clone());
                    }
                }
                self.outputs.insert(node_id.to_string(), outputs);
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!("Node {} failed: {}", node_id, message);
                self.errors.insert(node_id.to_string(), message.clone());
                self.transition(node_id, NodeStatus::Failed, Some(message), observer);
            }
        }
    }

    /// Decide why nodes are still pending once nothing can start.
    ///
    /// A pending node is skipped when one of its unsatisfied ports is fed
    /// only by nodes that already ended (or were skipped themselves), or has
    /// no connector at all. Whatever remains is stalled: it waits on a cycle
    /// or on a connector that can never deliver.
    fn classify_pending(
        &self,
        workflow: &Workflow,
        index: &ConnectorIndex<'_>,
        executor: &NodeExecutor,
    ) -> RunOutcome {
        let pending: Vec<&WorkflowNode> = workflow
            .nodes
            .iter()
            .filter(|n| self.status(&n.id) == NodeStatus::Pending)
            .collect();
        if pending.is_empty() {
            return RunOutcome::Finished;
        }

        let mut skipped: HashSet<&str> = HashSet::new();
        loop {
            let mut changed = false;
            for node in &pending {
                if skipped.contains(node.id.as_str()) {
                    continue;
                }
                if self.is_unreachable(node, index, executor, &skipped) {
                    skipped.insert(node.id.as_str());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let stalled: HashSet<&str> = pending
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| !skipped.contains(id))
            .collect();
        if stalled.is_empty() {
            tracing::debug!("{} nodes were never reached", skipped.len());
            return RunOutcome::Finished;
        }

        let mut blocked: Vec<NodeId> = stalled.iter().map(|id| id.to_string()).collect();
        blocked.sort();
        RunOutcome::Stalled {
            cycles: cycles_among(workflow, &stalled),
            blocked,
        }
    }

    fn is_unreachable(
        &self,
        node: &WorkflowNode,
        index: &ConnectorIndex<'_>,
        executor: &NodeExecutor,
        skipped: &HashSet<&str>,
    ) -> bool {
        let empty = HashMap::new();
        let inputs = self.inputs_of(&node.id).unwrap_or(&empty);

        required_ports(node, index, executor)
            .iter()
            .filter(|port| !inputs.contains_key(port.as_str()))
            .any(|port| {
                let feeders = index.incoming(&node.id, port);
                if feeders.is_empty() {
                    // Unconnected inputs make a node unreachable; inputs wired
                    // to a broken connector make it stalled.
                    return !index.has_orphan_into(&node.id, port);
                }
                feeders.iter().all(|c| {
                    self.status(&c.source).is_terminal() || skipped.contains(c.source.as_str())
                })
            })
    }

    fn into_report(self, workflow: &Workflow, outcome: RunOutcome, elapsed: Duration) -> RunReport {
        RunReport {
            run_id: self.run_id,
            workflow: workflow.name.clone(),
            outcome,
            statuses: self.statuses,
            outputs: self.outputs,
            errors: self.errors,
            durations: self.durations,
            elapsed,
        }
    }
}

/// Input ports that must hold a value before `node` can run
fn required_ports(
    node: &WorkflowNode,
    index: &ConnectorIndex<'_>,
    executor: &NodeExecutor,
) -> Vec<String> {
    match executor.registry().get(&node.node_type) {
        Some(spec) => spec.inputs().into_iter().map(|port| port.name).collect(),
        None => index
            .connected_ports(&node.id)
            .into_iter()
            .map(str::to_string)
            .collect(),
    }
}

/// Everything known about a run once it has terminated
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub workflow: String,
    pub outcome: RunOutcome,
    pub statuses: HashMap<NodeId, NodeStatus>,
    pub outputs: HashMap<NodeId, NodeOutputs>,
    pub errors: HashMap<NodeId, String>,
    pub durations: HashMap<NodeId, Duration>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.statuses.get(node_id).copied()
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }

    /// Nodes that never started
    pub fn not_reached(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .statuses
            .iter()
            .filter(|(_, status)| **status == NodeStatus::Pending)
            .map(|(id, _)| id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn error(&self, node_id: &str) -> Option<&str> {
        self.errors.get(node_id).map(String::as_str)
    }

    /// Turn a stalled run into an error; finished and cancelled runs pass
    pub fn into_result(self) -> Result<Self, WorkflowError> {
        match &self.outcome {
            RunOutcome::Stalled { blocked, .. } => Err(WorkflowError::Stalled(blocked.clone())),
            _ => Ok(self),
        }
    }
}
