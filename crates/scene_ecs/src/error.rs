//! Error types shared by the scene, components and chains

use thiserror::Error;

use crate::ecs::{ComponentId, NodeId, NodeKind};

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, SceneError>;

/// Scene-level errors
///
/// Contract violations abort the offending call and propagate to the
/// caller; nothing in the scene retries.
#[derive(Error, Debug)]
pub enum SceneError {
    /// Component already belongs to a node or waits in a node's buffer
    #[error("Component {0:?} already has an owner")]
    AlreadyOwned(ComponentId),

    /// Node is not part of the live scene
    #[error("Node {0:?} is not part of the scene")]
    NotOnScene(NodeId),

    /// Node was detached from the scene
    #[error("Can't run a component upon detached node {0:?}")]
    NodeDetached(NodeId),

    /// Node is already attached and can't be added again
    #[error("Node {0:?} is already on the scene")]
    AlreadyOnScene(NodeId),

    /// Parent/child link would create a cycle
    #[error("Adding {child:?} under {parent:?} would create a cycle")]
    CyclicHierarchy {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// The root node can't be detached, destroyed or re-parented
    #[error("Operation not allowed on the root node")]
    RootNode,

    /// Unknown or destroyed node handle
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    /// Unknown or released component handle
    #[error("Unknown component {0:?}")]
    UnknownComponent(ComponentId),

    /// Component callback is executing and can't be borrowed
    #[error("Component {0:?} is busy")]
    ComponentBusy(ComponentId),

    /// Lookup by a feature whose index isn't enabled
    #[error("Searching by {0} is not enabled")]
    SearchDisabled(&'static str),

    /// `clear_scene` was called from inside `update`
    #[error("Scene can't be cleared during update")]
    ClearDuringUpdate,

    /// `update` was called from inside `update`
    #[error("Scene update is not re-entrant")]
    ReentrantUpdate,

    /// Attempt to merge a chain that is already running
    #[error("Can't merge a running chain")]
    MergeRunningChain,

    /// Unbalanced BEGIN/END pairs
    #[error("Malformed chain: {0}")]
    MalformedChain(String),

    /// Node payload doesn't match the requested kind or type
    #[error("Invalid cast of {actual:?} node to {expected:?}")]
    InvalidCast {
        /// Requested kind
        expected: NodeKind,
        /// Actual kind
        actual: NodeKind,
    },

    /// Error raised by user code inside a callback
    #[error("Callback failed: {0}")]
    Callback(String),
}
