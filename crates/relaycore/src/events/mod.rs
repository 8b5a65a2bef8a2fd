// crates/relaycore/src/events/mod.rs

mod base;

pub use base::{
    EventBus, NodeStatus, NoopObserver, RunEvent, RunId, RunOutcome, StatusChange, StatusObserver,
};
