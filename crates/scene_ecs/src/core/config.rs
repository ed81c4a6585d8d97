//! # Unified Configuration System
//!
//! Configuration for the scene (which lookup tables it maintains, which
//! change notifications it publishes, debug tracing) and for the frame driver
//! (loop type, delta clamping, speed).
//!
//! ## Example
//!
//! ```toml
//! game_loop = "Fixed"
//! game_loop_fixed_tick = 16.0
//!
//! [scene]
//! indexes = "NAMES | TAGS | STATES"
//! notifications = "ATTRIBUTES"
//! debug_enabled = false
//! ```

use serde::{Serialize, Deserialize};

pub use crate::config::{Config, ConfigError};

bitflags::bitflags! {
    /// Lookup tables the scene keeps up to date for fast searches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct SearchIndexes: u8 {
        /// Search by node name
        const NAMES = 1 << 0;
        /// Search by tag
        const TAGS = 1 << 1;
        /// Search by flag
        const FLAGS = 1 << 2;
        /// Search by numeric state
        const STATES = 1 << 3;
    }
}

impl Default for SearchIndexes {
    fn default() -> Self {
        Self::NAMES | Self::TAGS
    }
}

bitflags::bitflags! {
    /// Node changes that are published on the message bus
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ChangeNotifications: u8 {
        /// `ATTRIBUTE_ADDED`, `ATTRIBUTE_CHANGED`, `ATTRIBUTE_REMOVED`
        const ATTRIBUTES = 1 << 0;
        /// `STATE_CHANGED`
        const STATES = 1 << 1;
        /// `FLAG_CHANGED`
        const FLAGS = 1 << 2;
        /// `TAG_ADDED`, `TAG_REMOVED`
        const TAGS = 1 << 3;
    }
}

/// # Scene Configuration
///
/// Decides which search tables exist, which node changes are broadcast and
/// whether message traffic is traced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Enabled search tables; disabled lookups fail with `SearchDisabled`
    pub indexes: SearchIndexes,
    /// Node changes published as messages
    pub notifications: ChangeNotifications,
    /// Trace every dispatch and attach a debug observer to the root
    pub debug_enabled: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            indexes: SearchIndexes::default(),
            notifications: ChangeNotifications::empty(),
            debug_enabled: false,
        }
    }
}

impl SceneConfig {
    /// Enable additional search tables
    pub fn with_indexes(mut self, indexes: SearchIndexes) -> Self {
        self.indexes |= indexes;
        self
    }

    /// Enable change notifications
    pub fn with_notifications(mut self, notifications: ChangeNotifications) -> Self {
        self.notifications |= notifications;
        self
    }

    /// Toggle debug tracing
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }
}

impl Config for SceneConfig {}

/// How the frame driver advances scene time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameLoopType {
    /// Every frame advances by `game_loop_fixed_tick`
    Fixed,
    /// Every frame advances by the measured (clamped) wall time
    #[default]
    Variable,
}

/// # Engine Configuration
///
/// Frame driver settings plus the configuration of the scene it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Loop type
    pub game_loop: GameLoopType,
    /// Upper bound for a measured frame delta, in milliseconds
    pub game_loop_threshold: f64,
    /// Frame length of the fixed loop, in milliseconds
    pub game_loop_fixed_tick: f64,
    /// Time multiplier applied to every delta
    pub speed: f64,
    /// Scene settings
    pub scene: SceneConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            game_loop: GameLoopType::Variable,
            game_loop_threshold: 300.0,
            game_loop_fixed_tick: 16.0,
            speed: 1.0,
            scene: SceneConfig::default(),
        }
    }
}

impl Config for EngineConfig {}
