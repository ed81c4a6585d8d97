//! Scene graph observers
//!
//! The [`Scene`](crate::ecs::Scene) owns the entity tree. A render or physics
//! backend that keeps its own mirror of the hierarchy plugs in a
//! [`SceneGraph`] and is told about every structural change.
//!
//! ```text
//! Scene (entity tree, components)
//!      ↓
//! SceneGraph (backend mirror)
//! ```

mod scene_graph;

pub use scene_graph::{SceneGraph, SimpleListGraph};
