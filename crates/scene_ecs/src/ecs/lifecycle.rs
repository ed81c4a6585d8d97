//! Component state machine
//!
//! The scene checks a behavior out of its slot for the duration of each
//! callback. Callbacks may freely call back into the scene; anything aimed at
//! the checked-out component itself is queued in the slot and runs as soon as
//! the current callback returns. Finishing or removing a busy component is
//! queued as a whole, so its `on_finish`, `on_detach` and `on_remove` always
//! see the owner and the state they expect. Attach and detach caused by the
//! owning node change the state right away and only queue the callback.

use crate::ecs::component::{ComponentSlot, Hook};
use crate::ecs::{Component, ComponentContext, ComponentId, ComponentState, NodeId, NodeState};
use crate::error::{Result, SceneError};
use crate::events::actions;

impl crate::ecs::Scene {
    // ---------------------------------------------------------------
    // Registration and lookup
    // ---------------------------------------------------------------

    /// Hand a behavior to the scene; it starts in `New`
    pub fn register_component<C: Component>(&mut self, component: C) -> ComponentId {
        self.register_boxed(Box::new(component))
    }

    /// Hand a boxed behavior to the scene
    pub fn register_boxed(&mut self, component: Box<dyn Component>) -> ComponentId {
        let serial = self.next_serial();
        let id = self.components.insert(ComponentSlot::new(serial, component));
        log::trace!("Registered component {:?}", id);
        id
    }

    /// Take a behavior back out of the scene
    ///
    /// Only unattached components can be released; the handle becomes
    /// invalid.
    pub fn release_component(&mut self, id: ComponentId) -> Result<Box<dyn Component>> {
        let slot = self.components.get(id).ok_or(SceneError::UnknownComponent(id))?;
        if slot.owner.is_some() || slot.queued_on.is_some() {
            return Err(SceneError::AlreadyOwned(id));
        }
        if slot.behavior.is_none() {
            return Err(SceneError::ComponentBusy(id));
        }
        self.unsubscribe_all(id);
        self.components
            .remove(id)
            .and_then(|slot| slot.behavior)
            .ok_or(SceneError::UnknownComponent(id))
    }

    /// Lifecycle state of a component
    pub fn component_state(&self, id: ComponentId) -> Option<ComponentState> {
        self.components.get(id).map(|slot| slot.state)
    }

    /// Node owning a component
    pub fn component_owner(&self, id: ComponentId) -> Option<NodeId> {
        self.components.get(id)?.owner
    }

    /// Name a component was registered with
    pub fn component_name(&self, id: ComponentId) -> Option<&str> {
        self.components.get(id).map(|slot| slot.name.as_str())
    }

    /// Finished or removed; unknown handles count as completed
    pub fn is_completed(&self, id: ComponentId) -> bool {
        self.component_state(id).map_or(true, ComponentState::is_completed)
    }

    pub(crate) fn is_retiring(&self, id: ComponentId) -> bool {
        self.components.get(id).is_some_and(|slot| slot.retiring)
    }

    /// Borrow a behavior as its concrete type
    ///
    /// `None` while one of the component's own callbacks is running.
    pub fn component<T: Component>(&self, id: ComponentId) -> Option<&T> {
        self.components.get(id)?.behavior.as_deref()?.as_any().downcast_ref()
    }

    /// Mutably borrow a behavior as its concrete type
    pub fn component_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut T> {
        self.components.get_mut(id)?.behavior.as_deref_mut()?.as_any_mut().downcast_mut()
    }

    /// Attached component of a node with the given name
    pub fn find_component_by_name(&self, node: NodeId, name: &str) -> Option<ComponentId> {
        self.nodes.get(node)?.components.iter().copied().find(|id| {
            self.components.get(*id).is_some_and(|slot| slot.name == name)
        })
    }

    fn is_owned_by(&self, id: ComponentId, node: NodeId) -> bool {
        self.component_owner(id) == Some(node)
    }

    fn set_state(&mut self, id: ComponentId, state: ComponentState) {
        if let Some(slot) = self.components.get_mut(id) {
            slot.state = state;
        }
    }

    // ---------------------------------------------------------------
    // Adding
    // ---------------------------------------------------------------

    fn check_unowned(&self, id: ComponentId) -> Result<()> {
        let slot = self.components.get(id).ok_or(SceneError::UnknownComponent(id))?;
        if slot.owner.is_some() || slot.queued_on.is_some() {
            return Err(SceneError::AlreadyOwned(id));
        }
        Ok(())
    }

    /// Buffer a component on a node
    ///
    /// It is initialized when the node next joins the scene or at the start
    /// of the node's next update.
    pub fn add_component(&mut self, node: NodeId, id: ComponentId) -> Result<()> {
        self.check_unowned(id)?;
        self.nodes
            .get_mut(node)
            .ok_or(SceneError::UnknownNode(node))?
            .pending
            .push(id);
        if let Some(slot) = self.components.get_mut(id) {
            slot.queued_on = Some(node);
        }
        Ok(())
    }

    /// Initialize a component on a live node right away
    ///
    /// If the node has already been updated in the current frame the
    /// component also receives one update call immediately.
    pub fn add_component_and_run(&mut self, node: NodeId, id: ComponentId) -> Result<()> {
        match self.nodes.get(node).map(|n| n.state) {
            None => return Err(SceneError::UnknownNode(node)),
            Some(NodeState::Attached) => {}
            Some(NodeState::Detached) => return Err(SceneError::NodeDetached(node)),
            Some(_) => return Err(SceneError::NotOnScene(node)),
        }
        self.check_unowned(id)?;
        self.init_new_component(node, id)?;

        let waiting = self
            .nodes
            .get(node)
            .map_or(true, |n| n.is_waiting_for_update(self.current_absolute));
        if !waiting {
            self.update_component(node, id, self.current_delta, self.current_absolute)?;
        }
        Ok(())
    }

    /// Register a behavior and buffer it on a node
    pub fn spawn_component<C: Component>(&mut self, node: NodeId, component: C) -> Result<ComponentId> {
        let id = self.register_component(component);
        self.add_component(node, id)?;
        Ok(id)
    }

    /// Register a behavior and run it on a live node right away
    pub fn spawn_component_and_run<C: Component>(&mut self, node: NodeId, component: C) -> Result<ComponentId> {
        let id = self.register_component(component);
        self.add_component_and_run(node, id)?;
        Ok(id)
    }

    pub(crate) fn init_pending_components(&mut self, node: NodeId) -> Result<()> {
        let Some(pending) = self.nodes.get_mut(node).map(|n| std::mem::take(&mut n.pending)) else {
            return Ok(());
        };
        for id in pending {
            match self.components.get_mut(id) {
                Some(slot) if slot.queued_on == Some(node) => slot.queued_on = None,
                _ => continue,
            }
            self.init_new_component(node, id)?;
        }
        Ok(())
    }

    fn init_new_component(&mut self, node: NodeId, id: ComponentId) -> Result<()> {
        let target = self.nodes.get_mut(node).ok_or(SceneError::UnknownNode(node))?;
        if !target.is_on_scene() {
            return Err(SceneError::NotOnScene(node));
        }
        let slot = self.components.get_mut(id).ok_or(SceneError::UnknownComponent(id))?;
        if slot.owner.is_some() {
            return Err(SceneError::AlreadyOwned(id));
        }
        slot.owner = Some(node);
        target.components.push(id);
        log::debug!("Component '{}' (#{}) added to node '{}'", slot.name, slot.serial, target.name);

        self.notify(actions::COMPONENT_ADDED, node, Some(id), None)?;

        self.run_hook(id, Hook::Init)?;
        if !self.is_owned_by(id, node) {
            return Ok(());
        }
        self.set_state(id, ComponentState::Initialized);

        self.run_hook(id, Hook::Attach)?;
        if !self.is_owned_by(id, node) {
            return Ok(());
        }
        self.enter_running(id);
        Ok(())
    }

    fn enter_running(&mut self, id: ComponentId) {
        let now = self.current_absolute;
        if let Some(slot) = self.components.get_mut(id) {
            slot.state = ComponentState::Running;
            slot.last_fixed_update = now;
        }
    }

    // ---------------------------------------------------------------
    // Detach / re-attach with the owning node
    // ---------------------------------------------------------------

    pub(crate) fn detach_component(&mut self, node: NodeId, id: ComponentId) -> Result<()> {
        if !self.is_owned_by(id, node) || self.component_state(id) == Some(ComponentState::Detached) {
            return Ok(());
        }
        self.unsubscribe_all(id);
        self.notify(actions::COMPONENT_DETACHED, node, Some(id), None)?;
        self.run_hook(id, Hook::Detach)?;
        if self.is_owned_by(id, node) {
            self.set_state(id, ComponentState::Detached);
        }
        Ok(())
    }

    pub(crate) fn reattach_component(&mut self, node: NodeId, id: ComponentId) -> Result<()> {
        if !self.is_owned_by(id, node) || self.component_state(id) != Some(ComponentState::Detached) {
            return Ok(());
        }
        self.notify(actions::COMPONENT_ADDED, node, Some(id), None)?;
        self.run_hook(id, Hook::Attach)?;
        if self.is_owned_by(id, node) {
            self.enter_running(id);
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Finishing and removal
    // ---------------------------------------------------------------

    /// Finish a running component and remove it from its owner
    ///
    /// Does nothing for components that aren't running. Called from one of
    /// the component's own callbacks, the whole cascade runs once that
    /// callback returns.
    pub fn finish_component(&mut self, id: ComponentId) -> Result<()> {
        let slot = self.components.get_mut(id).ok_or(SceneError::UnknownComponent(id))?;
        let Some(owner) = slot.owner else {
            return Ok(());
        };
        if slot.state != ComponentState::Running || slot.retiring {
            return Ok(());
        }
        if slot.behavior.is_none() {
            slot.retiring = true;
            slot.deferred.push(Hook::Retire { finish: true });
            return Ok(());
        }
        self.retire(id, owner)
    }

    /// Synchronously finish (if running), detach and remove a component
    ///
    /// A component still waiting in a node's buffer is simply taken out of
    /// it. Unattached components are left alone. A component removed from
    /// inside its own callback is removed as soon as that callback returns.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<()> {
        let slot = self.components.get_mut(id).ok_or(SceneError::UnknownComponent(id))?;
        if let Some(node) = slot.queued_on.take() {
            if let Some(node) = self.nodes.get_mut(node) {
                node.pending.retain(|pending| *pending != id);
            }
            return Ok(());
        }
        let Some(owner) = slot.owner else {
            return Ok(());
        };
        if slot.retiring {
            return Ok(());
        }
        if slot.behavior.is_none() {
            slot.retiring = true;
            slot.deferred.push(Hook::Retire { finish: false });
            return Ok(());
        }
        self.retire(id, owner)
    }

    /// FINISH (if running), DETACH and REMOVE, in that order
    fn retire(&mut self, id: ComponentId, owner: NodeId) -> Result<()> {
        if let Some(slot) = self.components.get_mut(id) {
            slot.retiring = true;
        }
        let result = self.retire_hooks(id, owner);
        let Some(slot) = self.components.get_mut(id) else {
            return result;
        };
        slot.retiring = false;
        result?;
        if slot.owner != Some(owner) {
            return Ok(());
        }

        slot.state = ComponentState::Removed;
        slot.owner = None;
        slot.last_fixed_update = 0.0;
        log::debug!("Component '{}' (#{}) removed", slot.name, slot.serial);
        let release = slot.release_on_remove;

        let on_scene = match self.nodes.get_mut(owner) {
            Some(node) => {
                node.components.retain(|c| *c != id);
                node.is_on_scene()
            }
            None => false,
        };
        self.unsubscribe_all(id);
        if on_scene {
            self.notify(actions::COMPONENT_REMOVED, owner, Some(id), None)?;
        }
        if release {
            self.free_component(id);
        }
        Ok(())
    }

    fn retire_hooks(&mut self, id: ComponentId, owner: NodeId) -> Result<()> {
        if self.component_state(id) == Some(ComponentState::Running) {
            self.run_hook(id, Hook::Finish)?;
            if !self.is_owned_by(id, owner) {
                return Ok(());
            }
            self.set_state(id, ComponentState::Finished);
        }
        if self.component_state(id) != Some(ComponentState::Detached) {
            self.run_hook(id, Hook::Detach)?;
            if !self.is_owned_by(id, owner) {
                return Ok(());
            }
            self.set_state(id, ComponentState::Detached);
        }
        self.run_hook(id, Hook::Remove)
    }

    /// Remove every component of a node, including buffered ones
    pub fn remove_all_components(&mut self, node: NodeId) -> Result<()> {
        let Some(target) = self.nodes.get(node) else {
            return Ok(());
        };
        let ids: Vec<ComponentId> = target.components.iter().chain(&target.pending).copied().collect();
        for id in ids {
            if self.components.contains_key(id) {
                self.remove_component(id)?;
            }
        }
        Ok(())
    }

    /// Drop the slots of components that belonged to a destroyed node
    ///
    /// Components still busy or on their way out are dropped as soon as they
    /// reach `Removed`.
    pub(crate) fn free_components(&mut self, ids: &[ComponentId]) {
        for &id in ids {
            let Some(slot) = self.components.get_mut(id) else {
                continue;
            };
            let settled = slot.owner.is_none() && slot.queued_on.is_none() && !slot.retiring;
            if settled && slot.behavior.is_some() {
                self.free_component(id);
            } else {
                slot.release_on_remove = true;
            }
        }
    }

    fn free_component(&mut self, id: ComponentId) {
        self.unsubscribe_all(id);
        if let Some(slot) = self.components.remove(id) {
            log::trace!("Component '{}' (#{}) dropped", slot.name, slot.serial);
        }
    }

    // ---------------------------------------------------------------
    // Callback dispatch
    // ---------------------------------------------------------------

    /// Run `call` with the behavior checked out of its slot
    ///
    /// Returns `Ok(None)` if the component is unknown or already busy.
    pub(crate) fn invoke<R>(
        &mut self,
        id: ComponentId,
        call: impl FnOnce(&mut dyn Component, &mut ComponentContext<'_>) -> Result<R>,
    ) -> Result<Option<R>> {
        let Some(mut behavior) = self.components.get_mut(id).and_then(|slot| slot.behavior.take()) else {
            return Ok(None);
        };
        let result = {
            let mut ctx = ComponentContext::new(self, id);
            call(&mut *behavior, &mut ctx)
        };
        match self.components.get_mut(id) {
            Some(slot) => slot.behavior = Some(behavior),
            None => log::trace!("Component {:?} vanished during its own callback", id),
        }
        let value = result?;
        self.flush_deferred(id)?;
        Ok(Some(value))
    }

    /// Run a lifecycle callback now, or queue it if the component is busy
    pub(crate) fn run_hook(&mut self, id: ComponentId, hook: Hook) -> Result<()> {
        let Some(slot) = self.components.get_mut(id) else {
            return Ok(());
        };
        if slot.behavior.is_none() {
            slot.deferred.push(hook);
            return Ok(());
        }
        self.call_hook(id, hook)
    }

    fn call_hook(&mut self, id: ComponentId, hook: Hook) -> Result<()> {
        self.invoke(id, |behavior, ctx| match hook {
            Hook::Init => behavior.on_init(ctx),
            Hook::Attach => behavior.on_attach(ctx),
            Hook::Detach => behavior.on_detach(ctx),
            Hook::Remove => behavior.on_remove(ctx),
            Hook::Finish => behavior.on_finish(ctx),
            Hook::Message(mut msg) => behavior.on_message(ctx, &mut msg).map(|_| ()),
            Hook::Retire { .. } => Ok(()),
        })?;
        Ok(())
    }

    fn flush_deferred(&mut self, id: ComponentId) -> Result<()> {
        loop {
            let hook = match self.components.get_mut(id) {
                Some(slot) if slot.behavior.is_some() && !slot.deferred.is_empty() => slot.deferred.remove(0),
                _ => return Ok(()),
            };
            match &hook {
                Hook::Retire { finish } => {
                    let forced = match self.components.get_mut(id) {
                        Some(slot) => {
                            slot.retiring = false;
                            slot.release_on_remove
                        }
                        None => return Ok(()),
                    };
                    if *finish && !forced {
                        self.finish_component(id)?;
                    } else {
                        self.remove_component(id)?;
                    }
                    continue;
                }
                Hook::Message(msg) => {
                    let still_listening =
                        self.is_subscribed(id, msg.action()) || self.is_subscribed(id, actions::ANY);
                    if !still_listening {
                        continue;
                    }
                }
                _ => {}
            }
            self.call_hook(id, hook)?;
        }
    }
}
