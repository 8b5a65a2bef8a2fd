use async_trait::async_trait;
use relaycore::{ExecutionContext, NodeError, NodeOutputs, NodeSpecification, PortDefinition};

pub const LOG: &str = "log";

/// Logs its input and passes it through unchanged
pub struct LogNode;

#[async_trait]
impl NodeSpecification for LogNode {
    fn node_type(&self) -> &str {
        LOG
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::new("in")]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::new("out")]
    }

    fn description(&self) -> &str {
        "Logs input values for debugging"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeOutputs, NodeError> {
        let payload = ctx.require_input("in")?.clone();
        let message = ctx
            .get_node_parameter("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");

        tracing::info!(node = ctx.node_id(), "DEBUG: {} {}", message, payload.to_json());

        Ok(NodeOutputs::new().take("out", payload))
    }
}
