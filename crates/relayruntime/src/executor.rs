use crate::registry::NodeRegistry;
use futures::FutureExt;
use relaycore::{
    ExecutionContext, NodeError, NodeOutputs, NodeSpecification, PortValue, Value, WorkflowNode,
};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Outcome of one node execution: outputs on success, the failure otherwise.
pub type NodeResult = Result<NodeOutputs, NodeError>;

/// Executes exactly one node instance and enforces its port contract.
///
/// Stateless per call; cloning is cheap.
#[derive(Clone)]
pub struct NodeExecutor {
    registry: Arc<NodeRegistry>,
    node_timeout: Option<Duration>,
}

impl NodeExecutor {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            node_timeout: None,
        }
    }

    /// Fail nodes whose execute function runs longer than `limit`
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.node_timeout = limit;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Whether every declared input port of `node` has a value in `inputs`.
    ///
    /// Nodes of unregistered types are never considered satisfied.
    pub fn check_inputs(&self, node: &WorkflowNode, inputs: &HashMap<String, Value>) -> bool {
        match self.registry.get(&node.node_type) {
            Some(spec) => spec
                .inputs()
                .iter()
                .all(|port| inputs.contains_key(&port.name)),
            None => false,
        }
    }

    /// Execute `node` with already-resolved inputs.
    ///
    /// Every failure, including a panic inside the node, comes back as
    /// `Err`; nothing escapes this call.
    pub async fn execute(
        &self,
        node: &WorkflowNode,
        inputs: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> NodeResult {
        let spec = self
            .registry
            .get(&node.node_type)
            .ok_or_else(|| NodeError::SpecificationNotFound(node.node_type.clone()))?;

        let ctx = ExecutionContext::for_node(node, inputs, cancellation);
        tracing::debug!("Executing node {} ({})", node.id, node.node_type);

        let execution = AssertUnwindSafe(spec.execute(ctx)).catch_unwind();
        let outcome = match self.node_timeout {
            Some(limit) => timeout(limit, execution).await.map_err(|_| NodeError::Timeout {
                millis: limit.as_millis() as u64,
            })?,
            None => execution.await,
        };

        let outputs = outcome.map_err(|payload| NodeError::Panicked(panic_message(payload)))??;
        validate_outputs(spec.as_ref(), &outputs)?;
        Ok(outputs)
    }
}

/// Every key must be a declared output port and every taken value must be
/// object-shaped.
pub fn validate_outputs(
    spec: &dyn NodeSpecification,
    outputs: &NodeOutputs,
) -> Result<(), NodeError> {
    let declared = spec.outputs();
    for (key, value) in &outputs.ports {
        if !declared.iter().any(|port| &port.name == key) {
            return Err(NodeError::InvalidOutputKey {
                key: key.clone(),
                node_type: spec.node_type().to_string(),
            });
        }
        if let PortValue::Taken(payload) = value {
            if !payload.is_object() {
                return Err(NodeError::InvalidOutputValue {
                    key: key.clone(),
                    node_type: spec.node_type().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
