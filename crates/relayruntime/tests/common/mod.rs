// crates/relayruntime/tests/common/mod.rs

#![allow(dead_code)]

use relaycore::{
    Connector, FnNode, NodeError, NodeOutputs, NodeStatus, StatusChange, Value, Workflow,
    WorkflowNode,
};
use relayruntime::{NodeExecutor, NodeRegistry, WorkflowRunner};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Registry with the small node vocabulary used across these tests
pub fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();

    let nodes = vec![
        FnNode::new("start", &[], &["start"], |_ctx| async {
            let payload = Value::object([("trigger", "manual")]);
            Ok::<_, NodeError>(NodeOutputs::new().take("start", payload))
        }),
        FnNode::new("pipe", &["in"], &["out"], |ctx| async move {
            let payload = ctx.require_input("in")?.clone();
            Ok::<_, NodeError>(NodeOutputs::new().take("out", payload))
        }),
        FnNode::new("branch", &["in"], &["success", "fail"], |ctx| async move {
            let outcome = ctx.parameter_or("outcome", Value::from("success"));
            let payload = Value::object([("branch", outcome.clone())]);
            let outputs = if outcome.as_str() == Some("success") {
                NodeOutputs::new().take("success", payload)
            } else {
                NodeOutputs::new().take("fail", payload)
            };
            Ok::<_, NodeError>(outputs)
        }),
        FnNode::new("boom", &["in"], &["out"], |_ctx| async {
            Err::<NodeOutputs, _>(NodeError::ExecutionFailed("boom".to_string()))
        }),
        FnNode::new("slow", &["in"], &["out"], |ctx| async move {
            let ms = ctx
                .get_node_parameter("ms")
                .and_then(|v| v.as_f64())
                .unwrap_or(50.0) as u64;
            tokio::select! {
                _ = ctx.cancellation().cancelled() => Err(NodeError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {
                    let payload = ctx.require_input("in")?.clone();
                    Ok(NodeOutputs::new().take("out", payload))
                }
            }
        }),
        FnNode::new("join", &["left", "right"], &["out"], |ctx| async move {
            let left = ctx.require_input("left")?.clone();
            let right = ctx.require_input("right")?.clone();
            let joined = Value::object([("left", left), ("right", right)]);
            Ok::<_, NodeError>(NodeOutputs::new().take("out", joined))
        }),
        FnNode::new("liar", &["in"], &["out"], |ctx| async move {
            let mode = ctx.parameter_or("mode", Value::from("key"));
            let outputs = match mode.as_str() {
                Some("value") => NodeOutputs::new().take("out", Value::from("plain text")),
                _ => NodeOutputs::new().take("bogus", Value::object([("x", 1i64)])),
            };
            Ok::<_, NodeError>(outputs)
        }),
        FnNode::new("panicky", &["in"], &["out"], |_ctx| async {
            if true {
                panic!("node exploded");
            }
            Ok::<_, NodeError>(NodeOutputs::new())
        }),
    ];

    for node in nodes {
        registry.register(Arc::new(node)).unwrap();
    }
    registry
}

pub fn runner() -> WorkflowRunner {
    WorkflowRunner::new(NodeExecutor::new(Arc::new(test_registry())))
}

/// Build a workflow from `(id, type)` nodes and `(source, port, target, port)` edges
pub fn workflow(nodes: &[(&str, &str)], edges: &[(&str, &str, &str, &str)]) -> Workflow {
    let mut workflow = Workflow::new("test");
    for (id, node_type) in nodes {
        workflow.nodes.push(WorkflowNode::new(*node_type).with_id(*id));
    }
    for (source, source_port, target, target_port) in edges {
        workflow
            .connectors
            .push(Connector::new(*source, *source_port, *target, *target_port));
    }
    workflow
}

pub fn set_parameter(workflow: &mut Workflow, node_id: &str, key: &str, value: impl Into<Value>) {
    let node = workflow
        .nodes
        .iter_mut()
        .find(|n| n.id == node_id)
        .expect("node exists");
    node.parameters.insert(key.to_string(), value.into());
}

/// Observer that records every status change
#[derive(Clone, Default)]
pub struct Recorder {
    changes: Arc<Mutex<Vec<StatusChange>>>,
}

impl Recorder {
    pub fn observer(&self) -> impl Fn(&StatusChange) + Send + Sync + 'static {
        let changes = self.changes.clone();
        move |change: &StatusChange| changes.lock().unwrap().push(change.clone())
    }

    pub fn changes(&self) -> Vec<StatusChange> {
        self.changes.lock().unwrap().clone()
    }

    /// Transitions of one node, in order
    pub fn statuses_of(&self, node_id: &str) -> Vec<NodeStatus> {
        self.changes()
            .into_iter()
            .filter(|c| c.node_id == node_id)
            .map(|c| c.status)
            .collect()
    }

    /// `(node, status)` pairs in the order they were reported
    pub fn timeline(&self) -> Vec<(String, NodeStatus)> {
        self.changes()
            .into_iter()
            .map(|c| (c.node_id, c.status))
            .collect()
    }
}
