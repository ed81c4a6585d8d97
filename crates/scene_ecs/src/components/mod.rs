//! Ready-made components
//!
//! - [`FuncComponent`]: behavior assembled from closures
//! - [`ChainComponent`]: scripted command chains (see [`chain`])
//! - [`DebugComponent`]: wildcard observer counting message traffic

pub mod chain;

mod debug_component;
mod func_component;

pub use chain::{ChainComponent, ComponentSource, Param};
pub use debug_component::DebugComponent;
pub use func_component::FuncComponent;
