//! Structural analysis of workflow graphs.
//!
//! The scheduler never trusts the editor to have kept the graph well formed,
//! so orphaned connectors, fan-in and cycles are found here, both before a
//! run (`validate`) and when a run can make no further progress.

use crate::registry::NodeRegistry;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use relaycore::{Connector, Workflow, WorkflowError};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Why a connector can never deliver a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanReason {
    MissingSource,
    MissingTarget,
    UndeclaredSourcePort,
}

impl fmt::Display for OrphanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrphanReason::MissingSource => f.write_str("source node does not exist"),
            OrphanReason::MissingTarget => f.write_str("target node does not exist"),
            OrphanReason::UndeclaredSourcePort => f.write_str("source port is not declared"),
        }
    }
}

/// Connectors of one workflow, indexed by port.
pub struct ConnectorIndex<'w> {
    incoming: HashMap<(&'w str, &'w str), Vec<&'w Connector>>,
    outgoing: HashMap<(&'w str, &'w str), Vec<&'w Connector>>,
    orphans: Vec<(&'w Connector, OrphanReason)>,
}

impl<'w> ConnectorIndex<'w> {
    pub fn build(workflow: &'w Workflow, registry: &NodeRegistry) -> Self {
        let mut incoming: HashMap<_, Vec<_>> = HashMap::new();
        let mut outgoing: HashMap<_, Vec<_>> = HashMap::new();
        let mut orphans = Vec::new();

        for connector in &workflow.connectors {
            let Some(source) = workflow.find_node(&connector.source) else {
                orphans.push((connector, OrphanReason::MissingSource));
                continue;
            };
            if workflow.find_node(&connector.target).is_none() {
                orphans.push((connector, OrphanReason::MissingTarget));
                continue;
            }
            if let Some(spec) = registry.get(&source.node_type) {
                if !spec.outputs().iter().any(|p| p.name == connector.source_port) {
                    orphans.push((connector, OrphanReason::UndeclaredSourcePort));
                    continue;
                }
            }

            incoming
                .entry((connector.target.as_str(), connector.target_port.as_str()))
                .or_default()
                .push(connector);
            outgoing
                .entry((connector.source.as_str(), connector.source_port.as_str()))
                .or_default()
                .push(connector);
        }

        Self {
            incoming,
            outgoing,
            orphans,
        }
    }

    /// Deliverable connectors into `node:port`
    pub fn incoming<'a>(&'a self, node: &'a str, port: &'a str) -> &'a [&'w Connector] {
        self.incoming
            .get(&(node, port))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Deliverable connectors out of `node:port`
    pub fn outgoing<'a>(&'a self, node: &'a str, port: &'a str) -> &'a [&'w Connector] {
        self.outgoing
            .get(&(node, port))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Input ports of `node` that have at least one deliverable connector
    pub fn connected_ports(&self, node: &str) -> Vec<&'w str> {
        let mut ports: Vec<&str> = self
            .incoming
            .keys()
            .filter(|(target, _)| *target == node)
            .map(|(_, port)| *port)
            .collect();
        ports.sort_unstable();
        ports
    }

    pub fn orphans(&self) -> &[(&'w Connector, OrphanReason)] {
        &self.orphans
    }

    /// Whether an orphaned connector points at `node:port`
    pub fn has_orphan_into(&self, node: &str, port: &str) -> bool {
        self.orphans
            .iter()
            .any(|(c, _)| c.target == node && c.target_port == port)
    }

    /// Input ports fed by more than one connector
    pub fn fan_in(&self) -> impl Iterator<Item = (&'w str, &'w str)> + '_ {
        self.incoming
            .iter()
            .filter(|(_, connectors)| connectors.len() > 1)
            .map(|(key, _)| *key)
    }
}

/// Groups of nodes that depend on each other in a cycle
pub fn find_cycles(workflow: &Workflow) -> Vec<Vec<String>> {
    let all: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    cycles_among(workflow, &all)
}

/// Cycles in the subgraph induced by `members`
pub fn cycles_among(workflow: &Workflow, members: &HashSet<&str>) -> Vec<Vec<String>> {
    let (graph, _) = build_graph(workflow, members);
    let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
        .into_iter()
        .filter(|component| component.len() > 1)
        .map(|component| {
            let mut ids: Vec<String> = component
                .into_iter()
                .map(|idx| graph[idx].to_string())
                .collect();
            ids.sort();
            ids
        })
        .collect();
    cycles.sort();
    cycles
}

fn build_graph<'w>(
    workflow: &'w Workflow,
    members: &HashSet<&str>,
) -> (DiGraph<&'w str, ()>, HashMap<&'w str, NodeIndex>) {
    let mut graph = DiGraph::new();
    let mut node_to_index = HashMap::new();

    for node in &workflow.nodes {
        if members.contains(node.id.as_str()) {
            let idx = graph.add_node(node.id.as_str());
            node_to_index.insert(node.id.as_str(), idx);
        }
    }
    for connector in &workflow.connectors {
        if let (Some(from), Some(to)) = (
            node_to_index.get(connector.source.as_str()),
            node_to_index.get(connector.target.as_str()),
        ) {
            graph.add_edge(*from, *to, ());
        }
    }

    (graph, node_to_index)
}

/// Non-fatal findings of [`validate`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

/// Pre-flight check of a workflow against a registry.
///
/// Structural violations, unknown node types, undeclared ports and cycles
/// are errors. Declared inputs without an incoming connector only produce a
/// warning: such nodes simply never run.
pub fn validate(
    workflow: &Workflow,
    registry: &NodeRegistry,
) -> Result<ValidationReport, WorkflowError> {
    workflow.check_structure()?;

    for node in &workflow.nodes {
        if !registry.has(&node.node_type) {
            return Err(WorkflowError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            });
        }
    }

    for connector in &workflow.connectors {
        let endpoints = [
            (&connector.source, &connector.source_port, true),
            (&connector.target, &connector.target_port, false),
        ];
        for (node_id, port, is_output) in endpoints {
            let declared = workflow
                .find_node(node_id)
                .and_then(|node| registry.get(&node.node_type))
                .map(|spec| if is_output { spec.outputs() } else { spec.inputs() })
                .unwrap_or_default();
            if !declared.iter().any(|p| &p.name == port) {
                return Err(WorkflowError::UnknownPort {
                    connector: connector.id.clone(),
                    node_id: node_id.clone(),
                    port: port.clone(),
                });
            }
        }
    }

    let all: HashSet<&str> = workflow.nodes.iter().map(|n| n.id.as_str()).collect();
    let (graph, _) = build_graph(workflow, &all);
    if toposort(&graph, None).is_err() {
        let members = find_cycles(workflow).into_iter().flatten().collect();
        return Err(WorkflowError::CyclicDependency(members));
    }

    let mut report = ValidationReport::default();
    for node in &workflow.nodes {
        let Some(spec) = registry.get(&node.node_type) else {
            continue;
        };
        for port in spec.inputs() {
            if workflow
                .incoming(&node.id)
                .all(|c| c.target_port != port.name)
            {
                report.warnings.push(format!(
                    "input '{}' of node {} has no incoming connector; the node will never run",
                    port.name, node.id
                ));
            }
        }
    }

    Ok(report)
}
