//! # Scene ECS
//!
//! An entity-component framework for frame-driven games.
//!
//! ## Features
//!
//! - **Entity Tree**: Named nodes with tags, flags, states and attributes
//! - **Component Lifecycle**: Init, attach, update, fixed update, detach, finish and removal
//! - **Message Bus**: Synchronous, ordered delivery with replies and tag filters
//! - **Chains**: Scripted sequences with loops, conditions and waits
//! - **Frame Driver**: Fixed or variable game loop with speed scaling
//!
//! ## Quick Start
//!
//! ```rust
//! use scene_ecs::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let mut engine = Engine::new("demo", EngineConfig::default());
//!     let root = engine.scene().root();
//!
//!     let ship = engine.scene_mut().create_node("ship");
//!     engine.scene_mut().add_child(root, ship)?;
//!     engine.scene_mut().spawn_component(
//!         ship,
//!         FuncComponent::new("thruster").with_duration(100.0),
//!     )?;
//!
//!     for _ in 0..10 {
//!         engine.step(16.0)?;
//!     }
//!     assert!(engine.scene().find_component_by_name(ship, "thruster").is_none());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core modules
pub mod core;
pub mod config;
pub mod foundation;
pub mod error;

// Entity-component runtime
pub mod ecs;
pub mod events;
pub mod scene;
pub mod components;

mod engine;

pub use engine::{Engine, EngineError};
pub use error::{Result, SceneError};

/// Common imports for framework users
pub mod prelude {
    pub use crate::{
        Engine, EngineError, SceneError,
        core::config::{ChangeNotifications, Config, EngineConfig, GameLoopType, SceneConfig, SearchIndexes},
        ecs::{Component, ComponentContext, ComponentId, ComponentState, Node, NodeId, NodeKind, QueryCondition, Scene},
        events::{actions, Message, Payload, Reply},
        components::{ChainComponent, ComponentSource, DebugComponent, FuncComponent, Param},
        foundation::time::Timer,
    };
}
