//! Scene: the entity tree and its tables
//!
//! A scene owns the node and component arenas, the subscriber table, the
//! optional search tables and the deferred invocation queue. Everything that
//! changes indexed node data (name, tags, flags, state) goes through here so
//! the tables and change notifications never drift from the nodes.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use crate::components::DebugComponent;
use crate::core::config::{ChangeNotifications, SceneConfig, SearchIndexes};
use crate::ecs::component::ComponentSlot;
use crate::ecs::scheduler::Invocation;
use crate::ecs::{ComponentId, Node, NodeId, NodeKind, NodeState, QueryCondition};
use crate::error::{Result, SceneError};
use crate::events::{actions, AttributeChange, FlagChange, StateChange, TagChange};
use crate::foundation::collections::{LookupMap, SlotMap};
use crate::scene::SceneGraph;

const ROOT_NAME: &str = "root";

/// Optional lookup tables, present only when enabled in the config
struct SearchTables {
    names: Option<LookupMap<String, NodeId>>,
    tags: Option<LookupMap<String, NodeId>>,
    flags: Option<LookupMap<u32, NodeId>>,
    states: Option<LookupMap<i32, NodeId>>,
}

impl SearchTables {
    fn new(indexes: SearchIndexes) -> Self {
        Self {
            names: indexes.contains(SearchIndexes::NAMES).then(LookupMap::new),
            tags: indexes.contains(SearchIndexes::TAGS).then(LookupMap::new),
            flags: indexes.contains(SearchIndexes::FLAGS).then(LookupMap::new),
            states: indexes.contains(SearchIndexes::STATES).then(LookupMap::new),
        }
    }

    fn insert(&mut self, id: NodeId, node: &Node) {
        if let Some(names) = &mut self.names {
            names.insert(node.name.clone(), id);
        }
        if let Some(tags) = &mut self.tags {
            for tag in &node.tags {
                tags.insert(tag.clone(), id);
            }
        }
        if let Some(flags) = &mut self.flags {
            for flag in node.flags.all() {
                flags.insert(flag, id);
            }
        }
        if let Some(states) = &mut self.states {
            states.insert(node.state_id, id);
        }
    }

    fn remove(&mut self, id: NodeId, node: &Node) {
        if let Some(names) = &mut self.names {
            names.remove(node.name.as_str(), id);
        }
        if let Some(tags) = &mut self.tags {
            for tag in &node.tags {
                tags.remove(tag.as_str(), id);
            }
        }
        if let Some(flags) = &mut self.flags {
            for flag in node.flags.all() {
                flags.remove(&flag, id);
            }
        }
        if let Some(states) = &mut self.states {
            states.remove(&node.state_id, id);
        }
    }
}

fn lookup<'a, K, Q>(table: Option<&'a LookupMap<K, NodeId>>, key: &Q, kind: &'static str) -> Result<&'a [NodeId]>
where
    K: std::borrow::Borrow<Q> + Eq + std::hash::Hash,
    Q: Eq + std::hash::Hash + ?Sized,
{
    table
        .map(|table| table.find_all(key))
        .ok_or(SceneError::SearchDisabled(kind))
}

/// Entity tree plus component arena, message bus and invocation queue
pub struct Scene {
    pub(crate) name: String,
    pub(crate) config: SceneConfig,
    pub(crate) nodes: SlotMap<NodeId, Node>,
    pub(crate) components: SlotMap<ComponentId, ComponentSlot>,
    pub(crate) root: NodeId,
    pub(crate) subscribers: LookupMap<String, ComponentId>,
    search: SearchTables,
    pub(crate) invocations: Vec<Invocation>,
    graph: Option<Box<dyn SceneGraph>>,
    pub(crate) is_updating: bool,
    pub(crate) scene_cleared: bool,
    pub(crate) current_delta: f64,
    pub(crate) current_absolute: f64,
    next_serial: u64,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new("scene", SceneConfig::default())
    }
}

impl Scene {
    /// Create a scene with an attached root node
    pub fn new(name: impl Into<String>, config: SceneConfig) -> Self {
        let mut scene = Self {
            name: name.into(),
            search: SearchTables::new(config.indexes),
            config,
            nodes: SlotMap::with_key(),
            components: SlotMap::with_key(),
            root: NodeId::default(),
            subscribers: LookupMap::new(),
            invocations: Vec::new(),
            graph: None,
            is_updating: false,
            scene_cleared: false,
            current_delta: 0.0,
            current_absolute: 0.0,
            next_serial: 0,
        };
        scene.root = scene.insert_root();
        if scene.config.debug_enabled {
            if let Err(err) = scene.install_debug_observer() {
                log::error!("Failed to install debug observer: {}", err);
            }
        }
        log::info!("Scene '{}' created", scene.name);
        scene
    }

    fn insert_root(&mut self) -> NodeId {
        let serial = self.next_serial();
        let mut root = Node::new(serial, ROOT_NAME.to_string(), NodeKind::Container, None);
        root.state = NodeState::Attached;
        let id = self.nodes.insert(root);
        if let Some(node) = self.nodes.get(id) {
            self.search.insert(id, node);
        }
        id
    }

    fn install_debug_observer(&mut self) -> Result<()> {
        let root = self.root;
        self.spawn_component_and_run(root, DebugComponent::new())?;
        Ok(())
    }

    pub(crate) fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Root node; global components and attributes live here
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Delta of the current (or last) frame
    pub fn current_delta(&self) -> f64 {
        self.current_delta
    }

    /// Absolute time of the current (or last) frame
    pub fn current_absolute(&self) -> f64 {
        self.current_absolute
    }

    /// Whether the update pass is running
    pub fn is_updating(&self) -> bool {
        self.is_updating
    }

    /// Install an observer mirroring structural changes
    pub fn set_scene_graph(&mut self, graph: Box<dyn SceneGraph>) {
        self.graph = Some(graph);
    }

    /// Installed structural observer
    pub fn scene_graph(&self) -> Option<&dyn SceneGraph> {
        self.graph.as_deref()
    }

    // ---------------------------------------------------------------
    // Tree structure
    // ---------------------------------------------------------------

    /// Create a detached container node
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.create_node_with(name, NodeKind::Container, None)
    }

    /// Create a detached node of the given kind with a backend payload
    pub fn create_node_with(
        &mut self,
        name: impl Into<String>,
        kind: NodeKind,
        payload: Option<Box<dyn Any>>,
    ) -> NodeId {
        let serial = self.next_serial();
        self.nodes.insert(Node::new(serial, name.into(), kind, payload))
    }

    /// Node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable node access, for payload casts
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    fn existing(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(SceneError::UnknownNode(id))
    }

    fn existing_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id)?.parent
    }

    /// Append `child` under `parent`
    ///
    /// A child that still hangs under another off-scene parent is moved. If
    /// `parent` is on the scene the whole subtree of `child` joins it.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if child == self.root {
            return Err(SceneError::RootNode);
        }
        let parent_attached = self.existing(parent)?.is_on_scene();
        let child_node = self.existing(child)?;
        if child_node.is_on_scene() {
            return Err(SceneError::AlreadyOnScene(child));
        }
        let previous_parent = child_node.parent;

        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(SceneError::CyclicHierarchy { parent, child });
            }
            cursor = self.parent(id);
        }

        if let Some(previous) = previous_parent {
            self.unlink(previous, child);
            if let Some(graph) = &mut self.graph {
                graph.on_child_detached(previous, child);
            }
        }
        self.existing_mut(parent)?.children.push(child);
        self.existing_mut(child)?.parent = Some(parent);
        if let Some(graph) = &mut self.graph {
            graph.on_child_added(parent, child);
        }

        if parent_attached {
            self.activate(child)?;
        }
        Ok(())
    }

    /// Remove a node from its parent, keeping the subtree alive
    ///
    /// Components of the subtree move to DETACHED and come back to RUNNING
    /// when the node is added to the scene again.
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }
        let node = self.existing(id)?;
        let was_attached = node.is_on_scene();
        if let Some(parent) = node.parent {
            self.unlink(parent, id);
            if let Some(graph) = &mut self.graph {
                graph.on_child_detached(parent, id);
            }
        }
        if was_attached {
            self.deactivate(id)?;
        }
        Ok(())
    }

    /// Tear down a node, its components and its whole subtree
    ///
    /// The handles of every destroyed node become invalid.
    pub fn destroy(&mut self, id: NodeId) -> Result<()> {
        if id == self.root {
            return Err(SceneError::RootNode);
        }
        if let Some(parent) = self.existing(id)?.parent {
            self.unlink(parent, id);
            if let Some(graph) = &mut self.graph {
                graph.on_child_destroyed(parent, id);
            }
        }
        self.teardown(id)
    }

    /// Destroy every child of a node
    pub fn destroy_children(&mut self, id: NodeId) -> Result<()> {
        let children = self.existing(id)?.children.clone();
        for child in children {
            if self.nodes.contains_key(child) {
                self.destroy(child)?;
            }
        }
        Ok(())
    }

    fn unlink(&mut self, parent: NodeId, child: NodeId) {
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }

    fn activate(&mut self, id: NodeId) -> Result<()> {
        let Some(node) = self.nodes.get_mut(id) else {
            return Ok(());
        };
        node.state = NodeState::Attached;
        log::debug!("Node '{}' (#{}) attached", node.name, node.serial);
        if let Some(node) = self.nodes.get(id) {
            self.search.insert(id, node);
        }
        self.notify(actions::OBJECT_ADDED, id, None, None)?;
        self.init_pending_components(id)?;

        let components = self.existing(id)?.components.clone();
        for component in components {
            self.reattach_component(id, component)?;
        }
        let children = self.existing(id)?.children.clone();
        for child in children {
            self.activate(child)?;
        }
        Ok(())
    }

    fn deactivate(&mut self, id: NodeId) -> Result<()> {
        let components = self.existing(id)?.components.clone();
        for component in components {
            self.detach_component(id, component)?;
        }
        let node = self.existing_mut(id)?;
        node.state = NodeState::Detached;
        log::debug!("Node '{}' (#{}) detached", node.name, node.serial);
        if let Some(node) = self.nodes.get(id) {
            self.search.remove(id, node);
        }
        self.notify(actions::OBJECT_REMOVED, id, None, None)?;

        let children = self.existing(id)?.children.clone();
        for child in children {
            self.deactivate(child)?;
        }
        Ok(())
    }

    fn teardown(&mut self, id: NodeId) -> Result<()> {
        let Some(node) = self.nodes.get(id) else {
            return Ok(());
        };
        let was_attached = node.is_on_scene();
        let owned: Vec<ComponentId> = node.components.iter().chain(&node.pending).copied().collect();
        log::debug!("Destroying node '{}' (#{})", node.name, node.serial);

        self.remove_all_components(id)?;
        self.free_components(&owned);

        let node = self.existing_mut(id)?;
        node.state = NodeState::Destroyed;
        let children = std::mem::take(&mut node.children);
        if was_attached {
            if let Some(node) = self.nodes.get(id) {
                self.search.remove(id, node);
            }
            self.notify(actions::OBJECT_REMOVED, id, None, None)?;
        }

        for child in children {
            if let Some(node) = self.nodes.get_mut(child) {
                node.parent = None;
            }
            self.teardown(child)?;
        }
        self.nodes.remove(id);
        Ok(())
    }

    /// Ids of `from` and all its descendants, depth-first, parents first
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            result.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        result
    }

    // ---------------------------------------------------------------
    // Node data
    // ---------------------------------------------------------------

    fn notifies(&self, id: NodeId, kind: ChangeNotifications) -> bool {
        self.config.notifications.contains(kind) && self.nodes.get(id).is_some_and(Node::is_on_scene)
    }

    /// Rename a node
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))?;
        let previous = std::mem::replace(&mut node.name, name.clone());
        if node.is_on_scene() {
            if let Some(names) = &mut self.search.names {
                names.remove(previous.as_str(), id);
                names.insert(name, id);
            }
        }
        Ok(())
    }

    /// Store an attribute, replacing any previous value under `key`
    pub fn assign_attribute<T: Any>(&mut self, id: NodeId, key: &str, value: T) -> Result<()> {
        let replaced = self
            .existing_mut(id)?
            .attributes
            .insert(key.to_string(), Box::new(value))
            .is_some();
        if self.notifies(id, ChangeNotifications::ATTRIBUTES) {
            let action = if replaced { actions::ATTRIBUTE_CHANGED } else { actions::ATTRIBUTE_ADDED };
            let change = AttributeChange { key: key.to_string() };
            self.notify(action, id, None, Some(Rc::new(change)))?;
        }
        Ok(())
    }

    /// Typed attribute of a node
    pub fn attribute<T: Any>(&self, id: NodeId, key: &str) -> Option<&T> {
        self.nodes.get(id)?.attribute(key)
    }

    /// Mutable typed attribute of a node
    pub fn attribute_mut<T: Any>(&mut self, id: NodeId, key: &str) -> Option<&mut T> {
        self.nodes.get_mut(id)?.attributes.get_mut(key)?.downcast_mut()
    }

    /// Delete an attribute; returns whether it existed
    pub fn remove_attribute(&mut self, id: NodeId, key: &str) -> Result<bool> {
        let removed = self.existing_mut(id)?.attributes.remove(key).is_some();
        if removed && self.notifies(id, ChangeNotifications::ATTRIBUTES) {
            let change = AttributeChange { key: key.to_string() };
            self.notify(actions::ATTRIBUTE_REMOVED, id, None, Some(Rc::new(change)))?;
        }
        Ok(removed)
    }

    /// Change the numeric state of a node
    pub fn set_state_id(&mut self, id: NodeId, state: i32) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))?;
        let previous = std::mem::replace(&mut node.state_id, state);
        if previous == state {
            return Ok(());
        }
        if node.is_on_scene() {
            if let Some(states) = &mut self.search.states {
                states.remove(&previous, id);
                states.insert(state, id);
            }
        }
        if self.notifies(id, ChangeNotifications::STATES) {
            let change = StateChange { previous, current: state };
            self.notify(actions::STATE_CHANGED, id, None, Some(Rc::new(change)))?;
        }
        Ok(())
    }

    /// Set a flag
    pub fn set_flag(&mut self, id: NodeId, flag: u32) -> Result<()> {
        let changed = self.existing_mut(id)?.flags.set(flag);
        self.flag_changed(id, flag, changed, true)
    }

    /// Clear a flag
    pub fn reset_flag(&mut self, id: NodeId, flag: u32) -> Result<()> {
        let changed = self.existing_mut(id)?.flags.reset(flag);
        self.flag_changed(id, flag, changed, false)
    }

    /// Toggle a flag
    pub fn invert_flag(&mut self, id: NodeId, flag: u32) -> Result<()> {
        let is_set = self.existing_mut(id)?.flags.invert(flag);
        self.flag_changed(id, flag, true, is_set)
    }

    /// Whether a node has a flag
    pub fn has_flag(&self, id: NodeId, flag: u32) -> bool {
        self.nodes.get(id).is_some_and(|node| node.has_flag(flag))
    }

    fn flag_changed(&mut self, id: NodeId, flag: u32, changed: bool, is_set: bool) -> Result<()> {
        if !changed {
            return Ok(());
        }
        let on_scene = self.nodes.get(id).is_some_and(Node::is_on_scene);
        if on_scene {
            if let Some(flags) = &mut self.search.flags {
                if is_set {
                    flags.insert(flag, id);
                } else {
                    flags.remove(&flag, id);
                }
            }
        }
        if self.notifies(id, ChangeNotifications::FLAGS) {
            self.notify(actions::FLAG_CHANGED, id, None, Some(Rc::new(FlagChange { flag, is_set })))?;
        }
        Ok(())
    }

    /// Add a tag
    pub fn add_tag(&mut self, id: NodeId, tag: &str) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))?;
        if !node.tags.insert(tag.to_string()) {
            return Ok(());
        }
        if node.is_on_scene() {
            if let Some(tags) = &mut self.search.tags {
                tags.insert(tag.to_string(), id);
            }
        }
        if self.notifies(id, ChangeNotifications::TAGS) {
            let change = TagChange { tag: tag.to_string() };
            self.notify(actions::TAG_ADDED, id, None, Some(Rc::new(change)))?;
        }
        Ok(())
    }

    /// Remove a tag
    pub fn remove_tag(&mut self, id: NodeId, tag: &str) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))?;
        if !node.tags.remove(tag) {
            return Ok(());
        }
        if node.is_on_scene() {
            if let Some(tags) = &mut self.search.tags {
                tags.remove(tag, id);
            }
        }
        if self.notifies(id, ChangeNotifications::TAGS) {
            let change = TagChange { tag: tag.to_string() };
            self.notify(actions::TAG_REMOVED, id, None, Some(Rc::new(change)))?;
        }
        Ok(())
    }

    /// Whether a node has a tag
    pub fn has_tag(&self, id: NodeId, tag: &str) -> bool {
        self.nodes.get(id).is_some_and(|node| node.has_tag(tag))
    }

    // ---------------------------------------------------------------
    // Globals
    // ---------------------------------------------------------------

    /// Buffer a component on the root node
    pub fn add_global_component(&mut self, component: ComponentId) -> Result<()> {
        self.add_component(self.root, component)
    }

    /// Add a component to the root node and run it immediately
    pub fn add_global_component_and_run(&mut self, component: ComponentId) -> Result<()> {
        self.add_component_and_run(self.root, component)
    }

    /// Remove a component from the root node
    pub fn remove_global_component(&mut self, component: ComponentId) -> Result<()> {
        if self.component_owner(component) != Some(self.root) {
            return Ok(());
        }
        self.remove_component(component)
    }

    /// Component of the root node with the given name
    pub fn find_global_component_by_name(&self, name: &str) -> Option<ComponentId> {
        self.find_component_by_name(self.root, name)
    }

    /// Store an attribute on the root node
    pub fn assign_global_attribute<T: Any>(&mut self, key: &str, value: T) -> Result<()> {
        self.assign_attribute(self.root, key, value)
    }

    /// Attribute of the root node
    pub fn global_attribute<T: Any>(&self, key: &str) -> Option<&T> {
        self.attribute(self.root, key)
    }

    /// Mutable attribute of the root node
    pub fn global_attribute_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        let root = self.root;
        self.attribute_mut(root, key)
    }

    /// Delete an attribute of the root node
    pub fn remove_global_attribute(&mut self, key: &str) -> Result<bool> {
        self.remove_attribute(self.root, key)
    }

    // ---------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------

    /// Node by id; same as [`node`](Self::node)
    pub fn find_object_by_id(&self, id: NodeId) -> Option<&Node> {
        self.node(id)
    }

    /// Scene nodes matching a condition, in tree order
    pub fn find_objects_by_query(&self, condition: &QueryCondition) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|node| condition.matches(node)))
            .collect()
    }

    /// First scene node matching a condition
    pub fn find_object_by_query(&self, condition: &QueryCondition) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.nodes.get(*id).is_some_and(|node| condition.matches(node)))
    }

    /// Scene nodes with the given name
    pub fn find_objects_by_name(&self, name: &str) -> Result<Vec<NodeId>> {
        lookup(self.search.names.as_ref(), name, "names").map(<[NodeId]>::to_vec)
    }

    /// First scene node with the given name
    pub fn find_object_by_name(&self, name: &str) -> Result<Option<NodeId>> {
        lookup(self.search.names.as_ref(), name, "names").map(|ids| ids.first().copied())
    }

    /// Scene nodes carrying a tag
    pub fn find_objects_by_tag(&self, tag: &str) -> Result<Vec<NodeId>> {
        lookup(self.search.tags.as_ref(), tag, "tags").map(<[NodeId]>::to_vec)
    }

    /// First scene node carrying a tag
    pub fn find_object_by_tag(&self, tag: &str) -> Result<Option<NodeId>> {
        lookup(self.search.tags.as_ref(), tag, "tags").map(|ids| ids.first().copied())
    }

    /// Scene nodes with a flag set
    pub fn find_objects_by_flag(&self, flag: u32) -> Result<Vec<NodeId>> {
        lookup(self.search.flags.as_ref(), &flag, "flags").map(<[NodeId]>::to_vec)
    }

    /// First scene node with a flag set
    pub fn find_object_by_flag(&self, flag: u32) -> Result<Option<NodeId>> {
        lookup(self.search.flags.as_ref(), &flag, "flags").map(|ids| ids.first().copied())
    }

    /// Scene nodes in a numeric state
    pub fn find_objects_by_state(&self, state: i32) -> Result<Vec<NodeId>> {
        lookup(self.search.states.as_ref(), &state, "states").map(<[NodeId]>::to_vec)
    }

    /// First scene node in a numeric state
    pub fn find_object_by_state(&self, state: i32) -> Result<Option<NodeId>> {
        lookup(self.search.states.as_ref(), &state, "states").map(|ids| ids.first().copied())
    }

    /// Number of nodes currently stored, on or off the scene
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of component slots held by the scene, attached or not
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // ---------------------------------------------------------------
    // Clearing
    // ---------------------------------------------------------------

    /// Tear down the whole tree and reset every table
    ///
    /// All components on the scene end up REMOVED; pending invocations are
    /// dropped and time restarts at zero. `config` replaces the current
    /// configuration when given.
    pub fn clear_scene(&mut self, config: Option<SceneConfig>) -> Result<()> {
        if self.is_updating {
            return Err(SceneError::ClearDuringUpdate);
        }
        log::info!("Clearing scene '{}'", self.name);
        let mut msg = crate::events::Message::new(actions::SCENE_CLEAR).with_data(self.name.clone());
        self.send_message(&mut msg, None)?;

        let old_root = self.root;
        self.teardown(old_root)?;
        if let Some(graph) = &mut self.graph {
            graph.clear();
        }
        if let Some(config) = config {
            self.config = config;
        }
        self.subscribers.clear();
        self.search = SearchTables::new(self.config.indexes);
        self.invocations.clear();
        self.current_delta = 0.0;
        self.current_absolute = 0.0;
        self.scene_cleared = true;
        self.root = self.insert_root();
        if self.config.debug_enabled {
            self.install_debug_observer()?;
        }
        Ok(())
    }

    /// Clear the scene at the end of the current frame
    pub fn clear_scene_async(&mut self, config: Option<SceneConfig>) {
        self.call_with_delay(0.0, move |scene| scene.clear_scene(config));
    }

    /// Per-name component counts, for diagnostics
    pub fn component_census(&self) -> HashMap<String, usize> {
        let mut census = HashMap::new();
        for slot in self.components.values().filter(|slot| slot.owner.is_some()) {
            *census.entry(slot.name.clone()).or_insert(0) += 1;
        }
        census
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("components", &self.components.len())
            .field("invocations", &self.invocations.len())
            .field("current_absolute", &self.current_absolute)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SimpleListGraph;

    fn scene_with(indexes: SearchIndexes) -> Scene {
        Scene::new("test", SceneConfig::default().with_indexes(indexes))
    }

    #[test]
    fn test_tree_structure() {
        let mut scene = Scene::default();
        let root = scene.root();
        let parent = scene.create_node("parent");
        let child = scene.create_node("child");

        scene.add_child(parent, child).unwrap();
        assert!(!scene.node(child).unwrap().is_on_scene());

        scene.add_child(root, parent).unwrap();
        assert!(scene.node(parent).unwrap().is_on_scene());
        assert!(scene.node(child).unwrap().is_on_scene());
        assert_eq!(scene.descendants(root), vec![root, parent, child]);
        assert_eq!(scene.parent(child), Some(parent));
    }

    #[test]
    fn test_add_child_rejects_attached_and_cycles() {
        let mut scene = Scene::default();
        let root = scene.root();
        let a = scene.create_node("a");
        let b = scene.create_node("b");
        scene.add_child(a, b).unwrap();

        assert!(matches!(scene.add_child(b, a), Err(SceneError::CyclicHierarchy { .. })));
        assert!(matches!(scene.add_child(a, a), Err(SceneError::CyclicHierarchy { .. })));

        scene.add_child(root, a).unwrap();
        let c = scene.create_node("c");
        scene.add_child(root, c).unwrap();
        assert!(matches!(scene.add_child(c, b), Err(SceneError::AlreadyOnScene(_))));
        assert!(matches!(scene.detach(root), Err(SceneError::RootNode)));
    }

    #[test]
    fn test_detach_keeps_subtree() {
        let mut scene = Scene::default();
        let root = scene.root();
        let parent = scene.create_node("parent");
        let child = scene.create_node("child");
        scene.add_child(root, parent).unwrap();
        scene.add_child(parent, child).unwrap();

        scene.detach(parent).unwrap();
        assert_eq!(scene.parent(parent), None);
        assert_eq!(scene.node(child).unwrap().state(), NodeState::Detached);
        assert_eq!(scene.parent(child), Some(parent));
        assert!(scene.find_objects_by_name("child").unwrap().is_empty());

        scene.add_child(root, parent).unwrap();
        assert_eq!(scene.find_objects_by_name("child").unwrap(), vec![child]);
    }

    #[test]
    fn test_destroy_invalidates_subtree() {
        let mut scene = Scene::default();
        let root = scene.root();
        let parent = scene.create_node("parent");
        let child = scene.create_node("child");
        let grandchild = scene.create_node("grandchild");
        scene.add_child(root, parent).unwrap();
        scene.add_child(parent, child).unwrap();
        scene.add_child(child, grandchild).unwrap();

        scene.destroy(parent).unwrap();
        assert!(scene.node(parent).is_none());
        assert!(scene.node(child).is_none());
        assert!(scene.node(grandchild).is_none());
        assert!(scene.node(root).unwrap().children().is_empty());
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn test_destroy_frees_component_slots() {
        let mut scene = Scene::default();
        let root = scene.root();
        let mut last = None;
        for i in 0..1000 {
            let node = scene.create_node(format!("n{i}"));
            scene.add_child(root, node).unwrap();
            last = Some(scene.spawn_component_and_run(node, crate::components::FuncComponent::new("c")).unwrap());
            scene.update(16.0, f64::from(i) * 16.0).unwrap();
            scene.destroy(node).unwrap();
        }
        assert_eq!(scene.node_count(), 1);
        assert_eq!(scene.component_count(), 0);

        // stale handles read as completed
        let last = last.unwrap();
        assert!(scene.component_state(last).is_none());
        assert!(scene.is_completed(last));
    }

    #[test]
    fn test_destroy_children() {
        let mut scene = Scene::default();
        let root = scene.root();
        for i in 0..3 {
            let node = scene.create_node(format!("n{i}"));
            scene.add_child(root, node).unwrap();
        }
        scene.destroy_children(root).unwrap();
        assert!(scene.node(root).unwrap().children().is_empty());
    }

    #[test]
    fn test_search_by_tag_and_name() {
        let mut scene = Scene::default();
        let root = scene.root();
        let a = scene.create_node("ship");
        let b = scene.create_node("ship");
        scene.add_tag(a, "player").unwrap();
        scene.add_child(root, a).unwrap();
        scene.add_child(root, b).unwrap();
        scene.add_tag(b, "player").unwrap();

        assert_eq!(scene.find_objects_by_tag("player").unwrap(), vec![a, b]);
        assert_eq!(scene.find_object_by_name("ship").unwrap(), Some(a));

        scene.remove_tag(a, "player").unwrap();
        assert_eq!(scene.find_objects_by_tag("player").unwrap(), vec![b]);
        assert!(scene.find_objects_by_tag("enemy").unwrap().is_empty());
    }

    #[test]
    fn test_disabled_search_is_an_error() {
        let scene = Scene::default();
        assert!(matches!(scene.find_objects_by_flag(1), Err(SceneError::SearchDisabled("flags"))));
        assert!(matches!(scene.find_object_by_state(1), Err(SceneError::SearchDisabled("states"))));
    }

    #[test]
    fn test_search_by_flag_and_state() {
        let mut scene = scene_with(SearchIndexes::FLAGS | SearchIndexes::STATES);
        let root = scene.root();
        let node = scene.create_node("probe");
        scene.set_flag(node, 128).unwrap();
        scene.set_state_id(node, 5).unwrap();
        scene.add_child(root, node).unwrap();

        assert_eq!(scene.find_objects_by_flag(128).unwrap(), vec![node]);
        assert_eq!(scene.find_object_by_state(5).unwrap(), Some(node));

        scene.invert_flag(node, 128).unwrap();
        scene.set_flag(node, 3).unwrap();
        scene.set_state_id(node, 6).unwrap();
        assert!(scene.find_objects_by_flag(128).unwrap().is_empty());
        assert_eq!(scene.find_objects_by_flag(3).unwrap(), vec![node]);
        assert!(scene.find_objects_by_state(5).unwrap().is_empty());
        assert_eq!(scene.find_objects_by_state(6).unwrap(), vec![node]);
    }

    #[test]
    fn test_find_objects_by_query() {
        let mut scene = Scene::default();
        let root = scene.root();
        let a = scene.create_node("rock");
        let b = scene.create_node("rock");
        scene.set_state_id(b, 2).unwrap();
        scene.add_child(root, a).unwrap();
        scene.add_child(a, b).unwrap();

        let rocks = QueryCondition::new().with_name("rock");
        assert_eq!(scene.find_objects_by_query(&rocks), vec![a, b]);
        assert_eq!(scene.find_object_by_query(&rocks.with_state(2)), Some(b));
    }

    #[test]
    fn test_attributes() {
        let mut scene = Scene::default();
        let node = scene.create_node("holder");
        scene.assign_attribute(node, "hp", 10_u32).unwrap();
        *scene.attribute_mut::<u32>(node, "hp").unwrap() += 5;

        assert_eq!(scene.attribute::<u32>(node, "hp"), Some(&15));
        assert_eq!(scene.attribute::<String>(node, "hp"), None);
        assert!(scene.remove_attribute(node, "hp").unwrap());
        assert!(!scene.remove_attribute(node, "hp").unwrap());

        scene.assign_global_attribute("level", "intro".to_string()).unwrap();
        assert_eq!(scene.global_attribute::<String>("level").map(String::as_str), Some("intro"));
    }

    #[test]
    fn test_scene_graph_observer() {
        let mut scene = Scene::default();
        scene.set_scene_graph(Box::new(SimpleListGraph::new()));
        let root = scene.root();
        let a = scene.create_node("a");
        let b = scene.create_node("b");
        scene.add_child(root, a).unwrap();
        scene.add_child(root, b).unwrap();
        assert_eq!(scene.scene_graph().unwrap().child_count(root), 2);

        scene.detach(a).unwrap();
        scene.destroy(b).unwrap();
        assert_eq!(scene.scene_graph().unwrap().entity_count(), 0);
    }

    #[test]
    fn test_clear_scene_resets_tree() {
        let mut scene = Scene::default();
        let old_root = scene.root();
        let node = scene.create_node("a");
        scene.add_child(old_root, node).unwrap();
        scene.call_with_delay(100.0, |_| Ok(()));

        scene.clear_scene(Some(SceneConfig::default().with_indexes(SearchIndexes::FLAGS))).unwrap();
        assert!(scene.node(node).is_none());
        assert!(scene.node(old_root).is_none());
        assert_ne!(scene.root(), old_root);
        assert_eq!(scene.pending_invocations(), 0);
        assert!(scene.find_objects_by_flag(1).unwrap().is_empty());
    }
}
