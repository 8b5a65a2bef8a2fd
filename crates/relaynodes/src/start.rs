use async_trait::async_trait;
use chrono::Utc;
use relaycore::{ExecutionContext, NodeError, NodeOutputs, NodeSpecification, PortDefinition, Value};

pub const START: &str = "start";

/// Entry point of a workflow. Has no inputs, so it is ready as soon as the
/// run begins.
///
/// An object `payload` parameter is merged into the emitted value.
pub struct StartNode;

#[async_trait]
impl NodeSpecification for StartNode {
    fn node_type(&self) -> &str {
        START
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::new("start").with_description("Trigger payload")]
    }

    fn description(&self) -> &str {
        "Start the workflow"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeOutputs, NodeError> {
        let mut fields = match ctx.get_node_parameter("payload") {
            None => Default::default(),
            Some(payload) => match Value::from(payload.to_json()) {
                Value::Object(map) => map,
                _ => {
                    return Err(NodeError::InvalidParameter {
                        name: "payload".to_string(),
                        reason: "expected an object".to_string(),
                    })
                }
            },
        };
        fields.insert("triggered_at".to_string(), Value::from(Utc::now().to_rfc3339()));

        Ok(NodeOutputs::new().take("start", Value::from(fields)))
    }
}
