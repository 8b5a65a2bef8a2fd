//! Standard node library
//!
//! Built-in node types plus the HTTP collaborators the request node uses

mod debug;
mod http;
mod request;
mod start;
mod time;

pub use debug::{LogNode, LOG};
pub use http::{HttpRequestNode, HTTP_REQUEST};
pub use request::{
    HttpRequestDefinition, HttpResponse, InMemoryRequestStore, RequestSender, RequestStore,
    ReqwestSender, SendError,
};
pub use start::{StartNode, START};
pub use time::{DelayNode, DELAY};

use relaycore::RegistryError;
use relayruntime::NodeRegistry;
use std::sync::Arc;

/// Register all standard nodes with a registry
pub fn register_all(
    registry: &mut NodeRegistry,
    store: Arc<dyn RequestStore>,
    sender: Arc<dyn RequestSender>,
) -> Result<(), RegistryError> {
    registry.register(Arc::new(StartNode))?;
    registry.register(Arc::new(HttpRequestNode::new(store, sender)))?;
    registry.register(Arc::new(DelayNode))?;
    registry.register(Arc::new(LogNode))?;
    Ok(())
}
