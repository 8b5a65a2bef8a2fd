use crate::{Value, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub type NodeId = String;

/// A user-authored graph of nodes and connectors, built fresh before each run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub connectors: Vec<Connector>,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, node: WorkflowNode) -> Result<NodeId, WorkflowError> {
        if self.find_node(&node.id).is_some() {
            return Err(WorkflowError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.push(node);
        Ok(id)
    }

    /// Add a connector from `source:source_port` to `target:target_port`.
    ///
    /// Fan-out is allowed; fan-in (two connectors into one input port),
    /// self-loops and duplicate connectors are rejected.
    pub fn connect(
        &mut self,
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Result<&Connector, WorkflowError> {
        let connector = Connector::new(source, source_port, target, target_port);

        if connector.source == connector.target {
            return Err(WorkflowError::SelfLoop(connector.id));
        }
        for endpoint in [&connector.source, &connector.target] {
            if self.find_node(endpoint).is_none() {
                return Err(WorkflowError::NodeNotFound(endpoint.clone()));
            }
        }
        if self.connectors.iter().any(|c| c.id == connector.id) {
            return Err(WorkflowError::DuplicateConnector(connector.id));
        }
        if self
            .connectors
            .iter()
            .any(|c| c.target == connector.target && c.target_port == connector.target_port)
        {
            return Err(WorkflowError::DuplicateTarget {
                target: connector.target,
                port: connector.target_port,
            });
        }

        self.connectors.push(connector);
        Ok(&self.connectors[self.connectors.len() - 1])
    }

    /// Re-check the construction invariants.
    ///
    /// Workflows deserialized from JSON never went through [`Workflow::connect`],
    /// so loaders call this before handing the graph to anything else.
    pub fn check_structure(&self) -> Result<(), WorkflowError> {
        let mut node_ids = HashSet::new();
        for node in &self.nodes {
            if !node_ids.insert(node.id.as_str()) {
                return Err(WorkflowError::DuplicateNode(node.id.clone()));
            }
        }

        let mut connector_ids = HashSet::new();
        let mut targets = HashSet::new();
        for connector in &self.connectors {
            if connector.source == connector.target {
                return Err(WorkflowError::SelfLoop(connector.id.clone()));
            }
            for endpoint in [&connector.source, &connector.target] {
                if !node_ids.contains(endpoint.as_str()) {
                    return Err(WorkflowError::NodeNotFound(endpoint.clone()));
                }
            }
            if !connector_ids.insert(connector.id.as_str()) {
                return Err(WorkflowError::DuplicateConnector(connector.id.clone()));
            }
            if !targets.insert((connector.target.as_str(), connector.target_port.as_str())) {
                return Err(WorkflowError::DuplicateTarget {
                    target: connector.target.clone(),
                    port: connector.target_port.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn find_node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Connectors terminating at `node_id`
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Connector> + 'a {
        self.connectors.iter().filter(move |c| c.target == node_id)
    }

    /// Connectors leaving `node_id` through `port`
    pub fn outgoing<'a>(
        &'a self,
        node_id: &'a str,
        port: &'a str,
    ) -> impl Iterator<Item = &'a Connector> + 'a {
        self.connectors
            .iter()
            .filter(move |c| c.source == node_id && c.source_port == port)
    }

    /// Node ids grouped by type, for diagnostics
    pub fn node_types(&self) -> HashMap<&str, Vec<&str>> {
        let mut types: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in &self.nodes {
            types.entry(node.node_type.as_str()).or_default().push(node.id.as_str());
        }
        types
    }
}

/// Node instance in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<Position>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl WorkflowNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_type: node_type.into(),
            name: None,
            position: None,
            parameters: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Directed edge from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    pub source: NodeId,
    pub source_port: String,
    pub target: NodeId,
    pub target_port: String,
}

impl Connector {
    pub fn new(
        source: impl Into<String>,
        source_port: impl Into<String>,
        target: impl Into<String>,
        target_port: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let source_port = source_port.into();
        let target = target.into();
        let target_port = target_port.into();
        Self {
            id: format!("{source}:{source_port}->{target}:{target_port}"),
            source,
            source_port,
            target,
            target_port,
        }
    }
}

/// Node position in the visual editor; opaque to the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_workflow() -> Workflow {
        let mut workflow = Workflow::new("test");
        workflow.add_node(WorkflowNode::new("start").with_id("start")).unwrap();
        workflow.add_node(WorkflowNode::new("http_request").with_id("req")).unwrap();
        workflow
    }

    #[test]
    fn connector_id_is_canonical() {
        let connector = Connector::new("a", "success", "b", "send");
        assert_eq!(connector.id, "a:success->b:send");
    }

    #[test]
    fn connect_rejects_self_loops() {
        let mut workflow = two_node_workflow();
        let err = workflow.connect("req", "success", "req", "send").unwrap_err();
        assert_eq!(err, WorkflowError::SelfLoop("req:success->req:send".into()));
    }

    #[test]
    fn connect_rejects_fan_in() {
        let mut workflow = two_node_workflow();
        workflow.add_node(WorkflowNode::new("start").with_id("other")).unwrap();
        workflow.connect("start", "start", "req", "send").unwrap();

        let err = workflow.connect("other", "start", "req", "send").unwrap_err();
        assert_eq!(
            err,
            WorkflowError::DuplicateTarget {
                target: "req".into(),
                port: "send".into()
            }
        );
        assert_eq!(workflow.connectors.len(), 1);
    }

    #[test]
    fn connect_rejects_duplicate_connector() {
        let mut workflow = two_node_workflow();
        workflow.connect("start", "start", "req", "send").unwrap();
        let err = workflow.connect("start", "start", "req", "send").unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateConnector("start:start->req:send".into()));
    }

    #[test]
    fn connect_allows_fan_out() {
        let mut workflow = two_node_workflow();
        workflow.add_node(WorkflowNode::new("http_request").with_id("req2")).unwrap();
        workflow.connect("start", "start", "req", "send").unwrap();
        workflow.connect("start", "start", "req2", "send").unwrap();

        assert_eq!(workflow.outgoing("start", "start").count(), 2);
        assert_eq!(workflow.incoming("req2").count(), 1);
        assert!(workflow.check_structure().is_ok());
    }

    #[test]
    fn add_node_rejects_duplicate_ids() {
        let mut workflow = two_node_workflow();
        let err = workflow.add_node(WorkflowNode::new("start").with_id("start")).unwrap_err();
        assert_eq!(err, WorkflowError::DuplicateNode("start".into()));
    }

    #[test]
    fn check_structure_catches_deserialized_violations() {
        let mut workflow = two_node_workflow();
        workflow.connectors.push(Connector::new("start", "start", "req", "send"));
        workflow.connectors.push(Connector::new("start", "other", "req", "send"));
        assert!(matches!(
            workflow.check_structure(),
            Err(WorkflowError::DuplicateTarget { .. })
        ));

        let mut workflow = two_node_workflow();
        workflow.connectors.push(Connector::new("start", "start", "ghost", "send"));
        assert_eq!(
            workflow.check_structure(),
            Err(WorkflowError::NodeNotFound("ghost".into()))
        );
    }

    #[test]
    fn workflow_round_trips_through_json() {
        let mut workflow = two_node_workflow();
        workflow.connect("start", "start", "req", "send").unwrap();

        let json = serde_json::to_value(&workflow).unwrap();
        assert_eq!(json["nodes"][0]["type"], "start");
        assert_eq!(json["connectors"][0]["sourcePort"], "start");

        let parsed: Workflow = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.connectors, workflow.connectors);
    }
}
