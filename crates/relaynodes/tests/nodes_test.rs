// crates/relaynodes/tests/nodes_test.rs

use relaycore::{ExecutionContext, NodeError, NodeSpecification, Value};
use relaynodes::{DelayNode, LogNode, StartNode};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// Helper function to create a test context
fn create_test_context(
    node_type: &str,
    parameters: HashMap<String, Value>,
    inputs: HashMap<String, Value>,
    cancellation: CancellationToken,
) -> ExecutionContext {
    ExecutionContext::new("node-1", node_type, parameters, inputs, cancellation)
}

fn payload() -> HashMap<String, Value> {
    HashMap::from([("in".to_string(), Value::object([("n", 7i64)]))])
}

#[tokio::test]
async fn test_start_emits_trigger_timestamp() {
    let ctx = create_test_context(
        "start",
        HashMap::new(),
        HashMap::new(),
        CancellationToken::new(),
    );

    let outputs = StartNode.execute(ctx).await.unwrap();

    let start = outputs.taken_value("start").unwrap();
    assert!(start.is_object());
    assert!(start
        .get("triggered_at")
        .is_some_and(|v| v.as_str().is_some()));
}

#[tokio::test]
async fn test_start_merges_payload_parameter() {
    let parameters = HashMap::from([(
        "payload".to_string(),
        Value::object([("user", "ada")]),
    )]);
    let ctx = create_test_context("start", parameters, HashMap::new(), CancellationToken::new());

    let outputs = StartNode.execute(ctx).await.unwrap();
    let start = outputs.taken_value("start").unwrap();
    assert_eq!(start.get("user"), Some(Value::from("ada")));

    let parameters = HashMap::from([("payload".to_string(), Value::from("not an object"))]);
    let ctx = create_test_context("start", parameters, HashMap::new(), CancellationToken::new());
    assert!(matches!(
        StartNode.execute(ctx).await,
        Err(NodeError::InvalidParameter { .. })
    ));
}

#[tokio::test]
async fn test_delay_passes_input_through() {
    let parameters = HashMap::from([("ms".to_string(), Value::from(20i64))]);
    let ctx = create_test_context("delay", parameters, payload(), CancellationToken::new());

    let started = Instant::now();
    let outputs = DelayNode.execute(ctx).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(
        outputs.taken_value("out"),
        Some(&Value::object([("n", 7i64)]))
    );
}

#[tokio::test]
async fn test_delay_stops_on_cancellation() {
    let parameters = HashMap::from([("ms".to_string(), Value::from(60_000i64))]);
    let token = CancellationToken::new();
    let ctx = create_test_context("delay", parameters, payload(), token.clone());

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let result = DelayNode.execute(ctx).await;
    assert_eq!(result.unwrap_err(), NodeError::Cancelled);
}

#[tokio::test]
async fn test_delay_rejects_negative_duration() {
    let parameters = HashMap::from([("ms".to_string(), Value::from(-5i64))]);
    let ctx = create_test_context("delay", parameters, payload(), CancellationToken::new());

    assert!(matches!(
        DelayNode.execute(ctx).await,
        Err(NodeError::InvalidParameter { .. })
    ));
}

#[tokio::test]
async fn test_log_passes_input_through() {
    let ctx = create_test_context("log", HashMap::new(), payload(), CancellationToken::new());

    let outputs = LogNode.execute(ctx).await.unwrap();
    assert_eq!(
        outputs.taken_value("out").and_then(|v| v.get("n")),
        Some(Value::from(7i64))
    );
}

#[tokio::test]
async fn test_log_requires_input() {
    let ctx = create_test_context("log", HashMap::new(), HashMap::new(), CancellationToken::new());

    assert_eq!(
        LogNode.execute(ctx).await.unwrap_err(),
        NodeError::MissingInput("in".to_string())
    );
}
