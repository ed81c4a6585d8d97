//! Entity-component core
//!
//! The [`Scene`] owns every node and component in slot-map arenas. Nodes form
//! a tree under the scene root; components hang off nodes and are driven
//! through their lifecycle by the scene.
//!
//! The scene's behavior is split across a few files:
//! - `scene.rs`: tree structure, node data, search tables, clearing
//! - `lifecycle.rs`: component state machine and callback dispatch
//! - `scheduler.rs`: per-frame update pass and deferred invocations
//! - `events::bus`: subscriptions and message delivery

pub mod component;
pub mod entity;
pub mod query;
pub mod scene;

mod lifecycle;
mod scheduler;

#[cfg(test)]
pub(crate) mod tests;

pub use component::{AsAny, Component, ComponentContext, ComponentId, ComponentState};
pub use entity::{Node, NodeId, NodeKind, NodeState};
pub use query::QueryCondition;
pub use scene::Scene;
pub use scheduler::Invocation;
