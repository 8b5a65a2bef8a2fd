//! Workflow execution runtime
//!
//! This crate provides the node registry, the node executor that enforces
//! each node type's port contract, and the data-flow scheduler that runs
//! workflows with concurrent, branching execution.

mod executor;
pub mod graph;
mod registry;
mod runtime;
mod scheduler;

pub use executor::{validate_outputs, NodeExecutor, NodeResult};
pub use graph::{ConnectorIndex, OrphanReason, ValidationReport};
pub use registry::NodeRegistry;
pub use runtime::{FlowRuntime, RuntimeConfig};
pub use scheduler::{RunReport, WorkflowRunner};
