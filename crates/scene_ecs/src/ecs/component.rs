//! Component lifecycle contract
//!
//! Every behavior implements [`Component`]. The scene owns the boxed
//! behavior and drives it through the states below; callbacks receive a
//! [`ComponentContext`] giving access to the scene and to the component's
//! own bookkeeping.
//!
//! ```text
//! NEW -> INITIALIZED -> RUNNING <-> DETACHED
//!                          |
//!                          v
//!                       FINISHED -> DETACHED -> REMOVED
//! ```

use std::any::Any;

use crate::ecs::{NodeId, Scene};
use crate::error::Result;
use crate::events::{Message, Payload, Reply};
use crate::foundation::collections::new_key_type;

new_key_type! {
    /// Handle of a component in the scene arena
    pub struct ComponentId;
}

/// Component lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    /// Registered, never initialized on a node
    New,
    /// Init callback done, attach pending
    Initialized,
    /// Receives updates
    Running,
    /// Owner left the scene; may come back to `Running`
    Detached,
    /// Finished, removal in progress
    Finished,
    /// Removed from its owner
    Removed,
}

impl ComponentState {
    /// Finished or removed
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Finished | Self::Removed)
    }
}

/// Downcasting support for boxed components
pub trait AsAny: Any {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Convert a box into `Box<dyn Any>`
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Behavior attached to a node
///
/// All callbacks have empty defaults. Errors returned from a callback abort
/// the operation that triggered it and propagate to the caller.
pub trait Component: AsAny {
    /// Name used by lookups such as `find_component_by_name`
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    /// Fixed-update rate in calls per second of scene time
    fn fixed_frequency(&self) -> Option<f64> {
        None
    }

    /// Called once, before the first attach
    fn on_init(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called every time the component joins a live node
    fn on_attach(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called for every message the component is subscribed to
    fn on_message(&mut self, _ctx: &mut ComponentContext<'_>, _msg: &mut Message) -> Result<Option<Reply>> {
        Ok(None)
    }

    /// Called once per frame while running
    fn on_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f64, _absolute: f64) -> Result<()> {
        Ok(())
    }

    /// Called at most once per frame when the fixed interval elapsed
    fn on_fixed_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f64, _absolute: f64) -> Result<()> {
        Ok(())
    }

    /// Called when leaving the live scene or on the way to removal
    fn on_detach(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once removal completes
    fn on_remove(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Called when a running component finishes
    fn on_finish(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Callback the scene owes a component
#[derive(Debug, Clone)]
pub(crate) enum Hook {
    Init,
    Attach,
    Detach,
    Remove,
    Finish,
    Message(Message),
    /// Finish (or just remove) requested while the behavior was checked out
    Retire { finish: bool },
}

/// Scene-side bookkeeping of one component
pub(crate) struct ComponentSlot {
    pub(crate) serial: u64,
    pub(crate) name: String,
    pub(crate) state: ComponentState,
    pub(crate) owner: Option<NodeId>,
    pub(crate) queued_on: Option<NodeId>,
    pub(crate) last_fixed_update: f64,
    /// `None` while one of its callbacks runs
    pub(crate) behavior: Option<Box<dyn Component>>,
    /// Hooks raised while the behavior was checked out
    pub(crate) deferred: Vec<Hook>,
    /// A finish or removal is queued or in progress
    pub(crate) retiring: bool,
    /// Drop the slot once `Removed` is reached; the owning node is gone
    pub(crate) release_on_remove: bool,
}

impl ComponentSlot {
    pub(crate) fn new(serial: u64, behavior: Box<dyn Component>) -> Self {
        Self {
            serial,
            name: behavior.name().to_string(),
            state: ComponentState::New,
            owner: None,
            queued_on: None,
            last_fixed_update: 0.0,
            behavior: Some(behavior),
            deferred: Vec::new(),
            retiring: false,
            release_on_remove: false,
        }
    }
}

/// Access to the scene from inside a component callback
pub struct ComponentContext<'a> {
    scene: &'a mut Scene,
    id: ComponentId,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(scene: &'a mut Scene, id: ComponentId) -> Self {
        Self { scene, id }
    }

    /// Id of the component being called
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// The scene
    pub fn scene(&mut self) -> &mut Scene {
        self.scene
    }

    /// Read-only view of the scene
    pub fn scene_ref(&self) -> &Scene {
        self.scene
    }

    /// Node owning this component
    pub fn owner(&self) -> Option<NodeId> {
        self.scene.component_owner(self.id)
    }

    /// Current lifecycle state
    pub fn state(&self) -> ComponentState {
        self.scene
            .component_state(self.id)
            .unwrap_or(ComponentState::Removed)
    }

    /// Subscribe this component to `action`
    pub fn subscribe(&mut self, action: &str) {
        self.scene.subscribe(self.id, action);
    }

    /// Unsubscribe this component from `action`
    pub fn unsubscribe(&mut self, action: &str) {
        self.scene.unsubscribe(self.id, action);
    }

    /// Send a message with this component as the source
    pub fn send_message(&mut self, action: &str, data: Option<Payload>) -> Result<Message> {
        self.send_message_filtered(action, data, None)
    }

    /// Send a message only to subscribers whose owner carries one of `tags`
    pub fn send_message_filtered(
        &mut self,
        action: &str,
        data: Option<Payload>,
        tags: Option<&[&str]>,
    ) -> Result<Message> {
        let mut msg = Message::new(action).with_source(self.id);
        if let Some(owner) = self.owner() {
            msg = msg.with_node(owner);
        }
        if let Some(data) = data {
            msg = msg.with_payload(data);
        }
        self.scene.send_message(&mut msg, tags)?;
        Ok(msg)
    }

    /// Finish this component
    ///
    /// The finish, detach and remove callbacks run once the current callback
    /// returns; until then [`is_finishing`](Self::is_finishing) is `true`.
    pub fn finish(&mut self) -> Result<()> {
        self.scene.finish_component(self.id)
    }

    /// A finish or removal of this component is pending or in progress
    pub fn is_finishing(&self) -> bool {
        self.scene.is_retiring(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rotation;

    #[test]
    fn test_default_name_is_type_name() {
        assert_eq!(Rotation.name(), "Rotation");
    }

    #[test]
    fn test_completed_states() {
        assert!(ComponentState::Finished.is_completed());
        assert!(ComponentState::Removed.is_completed());
        assert!(!ComponentState::Detached.is_completed());
        assert!(!ComponentState::Running.is_completed());
    }

    impl Component for Rotation {}
}
