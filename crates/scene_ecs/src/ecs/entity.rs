//! Entity tree nodes
//!
//! Nodes are stored in the scene's arena and addressed by [`NodeId`]. All
//! mutations go through [`Scene`](crate::ecs::Scene) so search tables and
//! change notifications stay consistent; this module only exposes reads.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};

use crate::ecs::ComponentId;
use crate::error::{Result, SceneError};
use crate::foundation::collections::new_key_type;
use crate::foundation::flags::Flags;

new_key_type! {
    /// Handle of a node in the scene arena
    pub struct NodeId;
}

/// Capability tag of a node
///
/// The scene never looks inside a node's payload; the kind only tells
/// external collaborators (renderers, physics bridges) what the payload is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Plain grouping node without a payload
    #[default]
    Container,
    /// Textured quad
    Sprite,
    /// Animated sprite
    AnimatedSprite,
    /// Repeating texture
    TilingSprite,
    /// Text label
    Text,
    /// Text rendered from a bitmap font
    BitmapText,
    /// Vector graphics
    Graphics,
    /// Arbitrary mesh
    Mesh,
    /// Batched particle container
    ParticleContainer,
}

/// Node lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Created but never part of the scene
    New,
    /// Part of the live scene
    Attached,
    /// Removed from the scene, subtree kept alive
    Detached,
    /// Torn down; handle is no longer valid
    Destroyed,
}

/// A node of the entity tree
pub struct Node {
    pub(crate) serial: u64,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) state_id: i32,
    pub(crate) flags: Flags,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) attributes: HashMap<String, Box<dyn Any>>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) components: Vec<ComponentId>,
    pub(crate) pending: Vec<ComponentId>,
    pub(crate) last_absolute: f64,
    pub(crate) payload: Option<Box<dyn Any>>,
}

impl Node {
    pub(crate) fn new(serial: u64, name: String, kind: NodeKind, payload: Option<Box<dyn Any>>) -> Self {
        Self {
            serial,
            name,
            kind,
            state: NodeState::New,
            state_id: 0,
            flags: Flags::new(),
            tags: BTreeSet::new(),
            attributes: HashMap::new(),
            parent: None,
            children: Vec::new(),
            components: Vec::new(),
            pending: Vec::new(),
            last_absolute: 0.0,
            payload,
        }
    }

    /// Creation order; unique within a scene
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capability tag
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Lifecycle state
    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Whether the node is part of the live scene
    pub fn is_on_scene(&self) -> bool {
        self.state == NodeState::Attached
    }

    /// Numeric game state
    pub fn state_id(&self) -> i32 {
        self.state_id
    }

    /// Whether `flag` is set
    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags.has(flag)
    }

    /// All set flags in ascending order
    pub fn flags(&self) -> Vec<u32> {
        self.flags.all()
    }

    /// Whether the node carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Tags in lexical order
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// Typed attribute lookup; `None` if absent or of another type
    pub fn attribute<T: Any>(&self, key: &str) -> Option<&T> {
        self.attributes.get(key)?.downcast_ref()
    }

    /// Whether an attribute with this key exists
    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Parent node, `None` for the root and for detached nodes
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Attached components in insertion order
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    /// Components waiting for the next flush
    pub fn pending_components(&self) -> &[ComponentId] {
        &self.pending
    }

    /// Whether this node still waits for its update in the current frame
    pub(crate) fn is_waiting_for_update(&self, current_absolute: f64) -> bool {
        self.last_absolute < current_absolute
    }

    /// Borrow the backend payload as `T`, checking the kind first
    pub fn cast<T: Any>(&self, kind: NodeKind) -> Result<&T> {
        if self.kind != kind {
            return Err(SceneError::InvalidCast { expected: kind, actual: self.kind });
        }
        self.payload
            .as_ref()
            .and_then(|payload| payload.downcast_ref())
            .ok_or(SceneError::InvalidCast { expected: kind, actual: self.kind })
    }

    /// Mutable variant of [`cast`](Self::cast)
    pub fn cast_mut<T: Any>(&mut self, kind: NodeKind) -> Result<&mut T> {
        let actual = self.kind;
        if actual != kind {
            return Err(SceneError::InvalidCast { expected: kind, actual });
        }
        self.payload
            .as_mut()
            .and_then(|payload| payload.downcast_mut())
            .ok_or(SceneError::InvalidCast { expected: kind, actual })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("serial", &self.serial)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("state_id", &self.state_id)
            .field("tags", &self.tags)
            .field("children", &self.children.len())
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}
