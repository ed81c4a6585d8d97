//! # Core Module
//!
//! Shared configuration types consumed by the scene and the frame driver.
//!
//! ## Organization
//!
//! - **Config**: Scene tables, change notifications and game-loop settings

pub mod config;

// Re-export foundation modules for convenience
pub use crate::foundation;

// Re-export commonly used config types
pub use config::{
    ChangeNotifications,
    Config,
    ConfigError,
    EngineConfig,
    GameLoopType,
    SceneConfig,
    SearchIndexes,
};
