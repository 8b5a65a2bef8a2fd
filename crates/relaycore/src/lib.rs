//! Core abstractions for the relay workflow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: the workflow graph, node specifications, port
//! payloads, status events and the error taxonomy.

mod error;
pub mod events;
mod node;
mod value;
mod workflow;

pub use error::{FlowError, NodeError, RegistryError, WorkflowError};
pub use events::*;
pub use node::{ExecutionContext, FnNode, NodeFuture, NodeSpecification, PortDefinition};
pub use value::{NodeOutputs, PortValue, Value};
pub use workflow::{Connector, NodeId, Position, Workflow, WorkflowNode};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
