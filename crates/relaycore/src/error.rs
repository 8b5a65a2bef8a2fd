use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure of a single node execution.
///
/// The `Display` output is the message surfaced to whoever renders node
/// status, so the wording of the contract variants is fixed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Node specification not found for type: {0}")]
    SpecificationNotFound(String),

    #[error("Invalid output key \"{key}\" returned by node type: {node_type}")]
    InvalidOutputKey { key: String, node_type: String },

    #[error("Invalid output value for key \"{key}\" returned by node type: {node_type}")]
    InvalidOutputValue { key: String, node_type: String },

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Node task panicked: {0}")]
    Panicked(String),
}

/// Problems with the shape of a workflow graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Connector {0} connects a node to itself")]
    SelfLoop(String),

    #[error("Input port {target}:{port} already has an incoming connector")]
    DuplicateTarget { target: String, port: String },

    #[error("Duplicate connector: {0}")]
    DuplicateConnector(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Unknown node type '{node_type}' on node {node_id}")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("Connector {connector} references undeclared port '{port}' on node {node_id}")]
    UnknownPort {
        connector: String,
        node_id: String,
        port: String,
    },

    #[error("Cyclic dependency between nodes: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Run stalled; no further progress possible for nodes: {}", .0.join(", "))]
    Stalled(Vec<String>),
}

/// Configuration errors raised while populating a node registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Node type already registered: {0}")]
    DuplicateType(String),

    #[error("Node type {node_type} declares port '{port}' more than once")]
    DuplicatePort { node_type: String, port: String },
}
