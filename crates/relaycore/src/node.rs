use crate::{NodeError, NodeOutputs, Value, WorkflowNode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Core trait that every registered node type implements
#[async_trait]
pub trait NodeSpecification: Send + Sync {
    /// Unique type identifier (e.g., "start", "http_request")
    fn node_type(&self) -> &str;

    /// Declared input ports, in display order
    fn inputs(&self) -> Vec<PortDefinition>;

    /// Declared output ports, in display order
    fn outputs(&self) -> Vec<PortDefinition>;

    /// Optional: human readable summary for node palettes
    fn description(&self) -> &str {
        ""
    }

    /// Execute one node instance
    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeOutputs, NodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Execution context handed to a node's execute function.
///
/// Lives for exactly one invocation. Parameters and inputs are read-only.
#[derive(Clone)]
pub struct ExecutionContext {
    node_id: String,
    node_type: String,
    parameters: HashMap<String, Value>,
    inputs: HashMap<String, Value>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        parameters: HashMap<String, Value>,
        inputs: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            parameters,
            inputs,
            cancellation,
        }
    }

    /// Bind a context to a workflow node and its resolved inputs
    pub fn for_node(
        node: &WorkflowNode,
        inputs: HashMap<String, Value>,
        cancellation: CancellationToken,
    ) -> Self {
        Self::new(
            node.id.clone(),
            node.node_type.clone(),
            node.parameters.clone(),
            inputs,
            cancellation,
        )
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn get_node_parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn get_input(&self, port: &str) -> Option<&Value> {
        self.inputs.get(port)
    }

    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    /// Get required input or return error
    pub fn require_input(&self, port: &str) -> Result<&Value, NodeError> {
        self.inputs
            .get(port)
            .ok_or_else(|| NodeError::MissingInput(port.to_string()))
    }

    /// Get parameter or return error
    pub fn require_parameter(&self, name: &str) -> Result<&Value, NodeError> {
        self.parameters
            .get(name)
            .ok_or_else(|| NodeError::MissingParameter(name.to_string()))
    }

    /// Get parameter with default
    pub fn parameter_or(&self, name: &str, default: Value) -> Value {
        self.parameters.get(name).cloned().unwrap_or(default)
    }

    /// Cancellation signal shared by every node of the run
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("node_id", &self.node_id)
            .field("node_type", &self.node_type)
            .field("parameters", &self.parameters.keys().collect::<Vec<_>>())
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutputs, NodeError>> + Send>>;

type ExecuteFn = dyn Fn(ExecutionContext) -> NodeFuture + Send + Sync;

/// Node type backed by a closure, for node types that don't need a struct.
#[derive(Clone)]
pub struct FnNode {
    node_type: String,
    description: String,
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
    execute: Arc<ExecuteFn>,
}

impl FnNode {
    pub fn new<F, Fut>(
        node_type: impl Into<String>,
        inputs: &[&str],
        outputs: &[&str],
        execute: F,
    ) -> Self
    where
        F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutputs, NodeError>> + Send + 'static,
    {
        Self {
            node_type: node_type.into(),
            description: String::new(),
            inputs: inputs.iter().map(|name| PortDefinition::new(*name)).collect(),
            outputs: outputs.iter().map(|name| PortDefinition::new(*name)).collect(),
            execute: Arc::new(move |ctx: ExecutionContext| -> NodeFuture {
                Box::pin(execute(ctx))
            }),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl NodeSpecification for FnNode {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        self.inputs.clone()
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        self.outputs.clone()
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeOutputs, NodeError> {
        (self.execute)(ctx).await
    }
}

impl fmt::Debug for FnNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnNode")
            .field("node_type", &self.node_type)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_node_exposes_ports_and_runs_closure() {
        let node = FnNode::new("echo", &["in"], &["out"], |ctx| async move {
            let payload = ctx.require_input("in")?.clone();
            Ok::<_, NodeError>(NodeOutputs::new().take("out", payload))
        });

        assert_eq!(node.node_type(), "echo");
        assert_eq!(node.inputs(), vec![PortDefinition::new("in")]);
        assert_eq!(node.outputs(), vec![PortDefinition::new("out")]);

        let mut inputs = HashMap::new();
        inputs.insert("in".to_string(), Value::object([("n", 1i64)]));
        let ctx = ExecutionContext::new(
            "n1",
            "echo",
            HashMap::new(),
            inputs,
            CancellationToken::new(),
        );

        let outputs = node.execute(ctx).await.unwrap();
        assert_eq!(outputs.taken_value("out"), Some(&Value::object([("n", 1i64)])));
    }

    #[test]
    fn context_reports_missing_values() {
        let mut parameters = HashMap::new();
        parameters.insert("request".to_string(), Value::from("req-1"));
        let ctx = ExecutionContext::new(
            "n1",
            "http_request",
            parameters,
            HashMap::new(),
            CancellationToken::new(),
        );

        assert_eq!(ctx.get_node_parameter("request"), Some(&Value::from("req-1")));
        assert_eq!(
            ctx.require_input("send").unwrap_err(),
            NodeError::MissingInput("send".to_string())
        );
        assert_eq!(
            ctx.require_parameter("timeout").unwrap_err(),
            NodeError::MissingParameter("timeout".to_string())
        );
        assert_eq!(ctx.parameter_or("timeout", Value::from(5i64)), Value::from(5i64));
    }
}
