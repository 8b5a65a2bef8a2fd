use async_trait::async_trait;
use relaycore::{ExecutionContext, NodeError, NodeOutputs, NodeSpecification, PortDefinition, Value};
use tokio::time::{sleep, Duration};

pub const DELAY: &str = "delay";

/// Wait `ms` milliseconds, then pass the input through
pub struct DelayNode;

#[async_trait]
impl NodeSpecification for DelayNode {
    fn node_type(&self) -> &str {
        DELAY
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::new("in")]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::new("out")]
    }

    fn description(&self) -> &str {
        "Delay execution for specified milliseconds"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeOutputs, NodeError> {
        let delay_ms = ctx.parameter_or("ms", Value::from(1000.0));
        let delay_ms = delay_ms
            .as_f64()
            .filter(|ms| *ms >= 0.0)
            .ok_or_else(|| NodeError::InvalidParameter {
                name: "ms".to_string(),
                reason: "expected a non-negative number".to_string(),
            })? as u64;

        tracing::debug!(node = ctx.node_id(), "Delaying for {}ms", delay_ms);

        tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(NodeError::Cancelled),
            _ = sleep(Duration::from_millis(delay_ms)) => {
                let payload = ctx.require_input("in")?.clone();
                Ok(NodeOutputs::new().take("out", payload))
            }
        }
    }
}
