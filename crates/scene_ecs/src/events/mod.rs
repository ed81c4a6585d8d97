//! Message bus types
//!
//! Key principles:
//! - Messages are keyed by an opaque action string
//! - Delivery is synchronous, in subscription order
//! - Any handler may expire a message to stop further delivery
//! - Handlers may reply; replies are collected on the message

mod bus;

use std::any::Any;
use std::rc::Rc;

use crate::ecs::{ComponentId, NodeId};

/// Shared, type-erased message payload
pub type Payload = Rc<dyn Any>;

/// Well-known actions published by the scene itself
pub mod actions {
    /// Wildcard; subscribers observe every message
    pub const ANY: &str = "ANY";
    /// A node joined the live scene
    pub const OBJECT_ADDED: &str = "OBJECT_ADDED";
    /// A node left the live scene
    pub const OBJECT_REMOVED: &str = "OBJECT_REMOVED";
    /// A component was initialized or re-attached on a live node
    pub const COMPONENT_ADDED: &str = "COMPONENT_ADDED";
    /// A component was detached with its node
    pub const COMPONENT_DETACHED: &str = "COMPONENT_DETACHED";
    /// A component was removed from its node
    pub const COMPONENT_REMOVED: &str = "COMPONENT_REMOVED";
    /// Attribute created
    pub const ATTRIBUTE_ADDED: &str = "ATTRIBUTE_ADDED";
    /// Attribute overwritten
    pub const ATTRIBUTE_CHANGED: &str = "ATTRIBUTE_CHANGED";
    /// Attribute deleted
    pub const ATTRIBUTE_REMOVED: &str = "ATTRIBUTE_REMOVED";
    /// Numeric state changed
    pub const STATE_CHANGED: &str = "STATE_CHANGED";
    /// Flag set or cleared
    pub const FLAG_CHANGED: &str = "FLAG_CHANGED";
    /// Tag added
    pub const TAG_ADDED: &str = "TAG_ADDED";
    /// Tag removed
    pub const TAG_REMOVED: &str = "TAG_REMOVED";
    /// The scene is about to be cleared
    pub const SCENE_CLEAR: &str = "SCENE_CLEAR";
}

/// Payload of `STATE_CHANGED`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    /// Value before the change
    pub previous: i32,
    /// Value after the change
    pub current: i32,
}

/// Payload of `FLAG_CHANGED`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    /// Flag index
    pub flag: u32,
    /// Whether the flag is now set
    pub is_set: bool,
}

/// Payload of `TAG_ADDED` and `TAG_REMOVED`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagChange {
    /// The tag
    pub tag: String,
}

/// Payload of the `ATTRIBUTE_*` messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeChange {
    /// Attribute key
    pub key: String,
}

/// Handler reply
#[derive(Debug, Clone)]
pub enum Reply {
    /// Successful result
    Data(Payload),
    /// Failure reported without stopping delivery
    Error(String),
}

impl Reply {
    /// Wrap a value as a successful reply
    pub fn data<T: Any>(value: T) -> Self {
        Self::Data(Rc::new(value))
    }

    /// Error reply
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error(reason.into())
    }
}

/// One collected reply
#[derive(Debug, Clone)]
pub struct MessageResponse {
    /// Replying component
    pub component: ComponentId,
    /// What it replied
    pub reply: Reply,
}

/// Replies collected during one dispatch
#[derive(Debug, Clone, Default)]
pub struct MessageResponses {
    responses: Vec<MessageResponse>,
}

impl MessageResponses {
    pub(crate) fn push(&mut self, component: ComponentId, reply: Reply) {
        self.responses.push(MessageResponse { component, reply });
    }

    /// Data of the first successful reply, if it has type `T`
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.responses.iter().find_map(|response| match &response.reply {
            Reply::Data(data) => data.downcast_ref(),
            Reply::Error(_) => None,
        })
    }

    /// At least one handler replied
    pub fn is_processed(&self) -> bool {
        !self.responses.is_empty()
    }

    /// Replied, and no reply is an error
    pub fn is_success(&self) -> bool {
        self.is_processed() && !self.is_error()
    }

    /// Some reply is an error
    pub fn is_error(&self) -> bool {
        self.responses.iter().any(|response| matches!(response.reply, Reply::Error(_)))
    }

    /// All replies in delivery order
    pub fn iter(&self) -> impl Iterator<Item = &MessageResponse> {
        self.responses.iter()
    }

    /// Number of replies
    pub fn len(&self) -> usize {
        self.responses.len()
    }

    /// No reply collected
    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

/// A message travelling through the bus
#[derive(Debug, Clone)]
pub struct Message {
    action: String,
    source: Option<ComponentId>,
    node: Option<NodeId>,
    data: Option<Payload>,
    /// Set by a handler to stop delivery to the remaining subscribers
    pub expired: bool,
    /// Replies collected so far
    pub responses: MessageResponses,
}

impl Message {
    /// Create a message for `action`
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            source: None,
            node: None,
            data: None,
            expired: false,
            responses: MessageResponses::default(),
        }
    }

    /// Set the sending component; it won't receive its own message
    pub fn with_source(mut self, source: ComponentId) -> Self {
        self.source = Some(source);
        self
    }

    /// Associate a node
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }

    /// Attach a payload value
    pub fn with_data<T: Any>(self, data: T) -> Self {
        self.with_payload(Rc::new(data))
    }

    /// Attach an already shared payload
    pub fn with_payload(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    /// Action key
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Sending component
    pub fn source(&self) -> Option<ComponentId> {
        self.source
    }

    /// Associated node
    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    /// Payload downcast to `T`
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }

    /// Raw shared payload
    pub fn payload(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Stop delivery to the remaining subscribers
    pub fn expire(&mut self) {
        self.expired = true;
    }

    /// Copy without the collected replies, used for deferred delivery
    pub(crate) fn redelivery(&self) -> Self {
        Self {
            responses: MessageResponses::default(),
            ..self.clone()
        }
    }
}
