use crate::request::{HttpResponse, RequestSender, RequestStore, SendError};
use async_trait::async_trait;
use relaycore::{ExecutionContext, NodeError, NodeOutputs, NodeSpecification, PortDefinition, Value};
use std::sync::Arc;

pub const HTTP_REQUEST: &str = "http_request";

/// Sends a stored HTTP request and branches on the response status.
///
/// Exactly one of `success` and `fail` is taken per run. A 4xx or 5xx
/// response is a normal outcome routed to `fail`; only transport errors,
/// unknown requests and cancellation fail the node itself.
pub struct HttpRequestNode {
    store: Arc<dyn RequestStore>,
    sender: Arc<dyn RequestSender>,
}

impl HttpRequestNode {
    pub fn new(store: Arc<dyn RequestStore>, sender: Arc<dyn RequestSender>) -> Self {
        Self { store, sender }
    }
}

#[async_trait]
impl NodeSpecification for HttpRequestNode {
    fn node_type(&self) -> &str {
        HTTP_REQUEST
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::new("send")
            .with_description("Any value; its arrival triggers the request")]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::new("success").with_description("Response with status below 400"),
            PortDefinition::new("fail").with_description("Error payload for 4xx and 5xx responses"),
        ]
    }

    fn description(&self) -> &str {
        "Send a stored HTTP request"
    }

    async fn execute(&self, ctx: ExecutionContext) -> Result<NodeOutputs, NodeError> {
        let request_id = ctx
            .require_parameter("request")?
            .as_str()
            .ok_or_else(|| NodeError::InvalidParameter {
                name: "request".to_string(),
                reason: "expected a stored request id".to_string(),
            })?
            .to_string();

        let request = self
            .store
            .find(&request_id)
            .await
            .ok_or_else(|| {
                NodeError::ExecutionFailed(format!("Stored request not found: {}", request_id))
            })?;

        tracing::info!(node = ctx.node_id(), "{} {}", request.method, request.url);

        let response = self
            .sender
            .send(&request, ctx.cancellation())
            .await
            .map_err(|e| match e {
                SendError::Cancelled => NodeError::Cancelled,
                other => NodeError::ExecutionFailed(format!("HTTP request failed: {}", other)),
            })?;

        tracing::info!(
            node = ctx.node_id(),
            "Response status: {} in {:?}",
            response.status,
            response.elapsed
        );

        let outputs = if response.is_success() {
            NodeOutputs::new()
                .take("success", success_payload(&request_id, &response))
                .skip("fail")
        } else {
            NodeOutputs::new()
                .take("fail", fail_payload(&request_id, &response))
                .skip("success")
        };
        Ok(outputs)
    }
}

fn success_payload(request_id: &str, response: &HttpResponse) -> Value {
    Value::object([
        ("request", Value::from(request_id)),
        ("status", Value::from(response.status)),
        ("headers", headers_value(response)),
        ("body", body_value(&response.body)),
        ("elapsed_ms", Value::from(response.elapsed.as_millis() as f64)),
    ])
}

fn fail_payload(request_id: &str, response: &HttpResponse) -> Value {
    Value::object([
        ("request", Value::from(request_id)),
        ("status", Value::from(response.status)),
        ("error", Value::from(format!("HTTP {}", response.status))),
        ("body", body_value(&response.body)),
    ])
}

fn headers_value(response: &HttpResponse) -> Value {
    Value::object(response.headers.iter().map(|(k, v)| (k.clone(), v.clone())))
}

/// JSON bodies are handed downstream parsed, anything else as text
fn body_value(body: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => Value::Json(json),
        Err(_) => Value::from(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_are_parsed_when_json() {
        assert!(matches!(body_value(r#"{"ok": true}"#), Value::Json(_)));
        assert_eq!(body_value("plain"), Value::from("plain"));
    }
}
