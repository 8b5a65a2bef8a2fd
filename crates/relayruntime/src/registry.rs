use relaycore::{NodeSpecification, PortDefinition, RegistryError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Catalog of available node types.
///
/// Populated once through `&mut self` while the application is composed,
/// then shared behind an `Arc` for runs; reads need no locking.
pub struct NodeRegistry {
    specs: HashMap<String, Arc<dyn NodeSpecification>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// Register a node type.
    ///
    /// A type can be registered once; the first registration stays in place
    /// when a duplicate is rejected.
    pub fn register(&mut self, spec: Arc<dyn NodeSpecification>) -> Result<(), RegistryError> {
        let node_type = spec.node_type().to_string();
        if self.specs.contains_key(&node_type) {
            return Err(RegistryError::DuplicateType(node_type));
        }
        check_unique_ports(&node_type, &spec.inputs())?;
        check_unique_ports(&node_type, &spec.outputs())?;

        tracing::info!("Registering node type: {}", node_type);
        self.specs.insert(node_type, spec);
        Ok(())
    }

    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeSpecification>> {
        self.specs.get(node_type).cloned()
    }

    pub fn has(&self, node_type: &str) -> bool {
        self.specs.contains_key(node_type)
    }

    /// Snapshot of all registered specifications, sorted by type
    pub fn list(&self) -> Vec<Arc<dyn NodeSpecification>> {
        let mut specs: Vec<_> = self.specs.values().cloned().collect();
        specs.sort_by(|a, b| a.node_type().cmp(b.node_type()));
        specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_unique_ports(node_type: &str, ports: &[PortDefinition]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.name.as_str()) {
            return Err(RegistryError::DuplicatePort {
                node_type: node_type.to_string(),
                port: port.name.clone(),
            });
        }
    }
    Ok(())
}
