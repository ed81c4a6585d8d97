//! Scripted command chains
//!
//! A [`ChainComponent`] holds a list of commands played by a cursor once per
//! update. Synchronous commands run back to back within the same update;
//! waits leave the cursor where it is and resume on the next one.
//!
//! ```rust
//! use scene_ecs::components::{ChainComponent, FuncComponent};
//!
//! let chain = ChainComponent::new("intro")
//!     .begin_repeat(3)
//!     .wait_time(500.0)
//!     .add_component_with(|_| FuncComponent::new("flash").with_duration(200.0))
//!     .end_repeat()
//!     .wait_for_message("START")
//!     .call(|ctx| {
//!         log::info!("intro done");
//!         ctx.finish()
//!     });
//! ```

mod command;

pub use command::{ChainCall, ComponentSource, Condition, Param};

use command::{jump_table, Command, Lazy, WaitMode};

use crate::ecs::{Component, ComponentContext, ComponentId, ComponentState, NodeId, QueryCondition, Scene};
use crate::error::{Result, SceneError};
use crate::events::{Message, Reply};

/// Synchronous steps allowed in one update before the chain yields
pub const DEFAULT_STEP_LIMIT: usize = 10_000;

/// Open loop or interval
#[derive(Debug, Clone, Copy)]
struct Scope {
    begin: usize,
    /// Iterations left for repeat scopes; `None` loops forever
    remaining: Option<u32>,
}

enum Flow {
    Next,
    Jump(usize),
    Block,
}

/// Component interpreting a list of commands
pub struct ChainComponent {
    name: String,
    commands: Vec<Command>,
    cursor: usize,
    scopes: Vec<Scope>,
    jumps: Option<Vec<usize>>,
    abort_conditions: Vec<Condition>,
    step_limit: usize,
    running: bool,
    /// Subscriptions left behind by waits a merge reset; dropped on the next update
    lapsed_waits: Vec<String>,
}

impl Default for ChainComponent {
    fn default() -> Self {
        Self::new("Chain")
    }
}

impl ChainComponent {
    /// Create an empty chain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
            cursor: 0,
            scopes: Vec::new(),
            jumps: None,
            abort_conditions: Vec::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            running: false,
            lapsed_waits: Vec::new(),
        }
    }

    /// Maximum number of synchronous steps per update
    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit.max(1);
        self
    }

    /// Whether the chain is attached and playing
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of commands in the chain
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the chain has no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn push(mut self, command: Command) -> Self {
        self.commands.push(command);
        self.jumps = None;
        self
    }

    /// Append the commands of `other`, leaving it empty
    ///
    /// Fails if `other` is running.
    pub fn merge_with(&mut self, other: &mut ChainComponent) -> Result<&mut Self> {
        if other.running {
            return Err(SceneError::MergeRunningChain);
        }
        self.commands.append(&mut other.commands);
        self.jumps = None;
        other.jumps = None;
        Ok(self)
    }

    /// Put the commands of `other` in front of this chain and restart it
    ///
    /// Fails if `other` is running.
    pub fn merge_at_beginning(&mut self, other: &mut ChainComponent) -> Result<&mut Self> {
        if other.running {
            return Err(SceneError::MergeRunningChain);
        }
        let mut commands = std::mem::take(&mut other.commands);
        commands.append(&mut self.commands);
        self.commands = commands;
        for command in &mut self.commands {
            if let Command::WaitForMessage { action, subscribed: true, .. } = command {
                self.lapsed_waits.push(action.clone());
            }
            command.reset();
        }
        self.cursor = 0;
        self.scopes.clear();
        self.jumps = None;
        other.jumps = None;
        Ok(self)
    }

    /// Run the chain on `node` right away
    pub fn execute_upon(self, scene: &mut Scene, node: NodeId) -> Result<ComponentId> {
        scene.spawn_component_and_run(node, self)
    }

    /// Finish the chain as soon as `condition` holds; checked before every step
    pub fn add_abort_condition(mut self, condition: impl Fn(&Scene) -> bool + 'static) -> Self {
        self.abort_conditions.push(Box::new(condition));
        self
    }

    // ---------------------------------------------------------------
    // Builder
    // ---------------------------------------------------------------

    /// Repeat the block up to [`end_repeat`](Self::end_repeat) `count` times; zero repeats forever
    pub fn begin_repeat(self, count: impl Into<Param<u32>>) -> Self {
        self.push(Command::BeginRepeat(count.into()))
    }

    /// Close a repeat block
    pub fn end_repeat(self) -> Self {
        self.push(Command::EndRepeat)
    }

    /// Run a callback
    pub fn call(self, f: impl FnMut(&mut ComponentContext<'_>) -> Result<()> + 'static) -> Self {
        self.push(Command::Call(Box::new(f)))
    }

    /// Run the block up to [`end_while`](Self::end_while), then repeat it while `condition` holds
    pub fn begin_while(self, condition: impl Fn(&Scene) -> bool + 'static) -> Self {
        self.push(Command::BeginWhile(Box::new(condition)))
    }

    /// Close a while block
    pub fn end_while(self) -> Self {
        self.push(Command::EndWhile)
    }

    /// Run the block up to [`end_interval`](Self::end_interval) every `period` ms, forever
    pub fn begin_interval(self, period: impl Into<Param<f64>>) -> Self {
        self.push(Command::BeginInterval { period: Lazy::new(period.into()), started: None })
    }

    /// Close an interval block
    pub fn end_interval(self) -> Self {
        self.push(Command::EndInterval)
    }

    /// Run the following commands only if `condition` holds
    pub fn begin_if(self, condition: impl Fn(&Scene) -> bool + 'static) -> Self {
        self.push(Command::BeginIf(Box::new(condition)))
    }

    /// Commands run when the matching `begin_if` condition failed
    pub fn otherwise(self) -> Self {
        self.push(Command::Else)
    }

    /// Close an if block
    pub fn end_if(self) -> Self {
        self.push(Command::EndIf)
    }

    /// Wait for `duration` ms of scene time
    pub fn wait_time(self, duration: impl Into<Param<f64>>) -> Self {
        self.push(Command::WaitTime { duration: Lazy::new(duration.into()), started: None })
    }

    /// Add a component to the chain's owner
    pub fn add_component(self, source: impl Into<ComponentSource>) -> Self {
        self.push(Command::AddComponent { source: source.into(), target: None })
    }

    /// Add a component built by `factory` to the chain's owner, once per pass
    pub fn add_component_with<C: Component>(self, factory: impl FnMut(&mut Scene) -> C + 'static) -> Self {
        self.add_component(ComponentSource::factory(factory))
    }

    /// Add a component to another node
    pub fn add_component_to(self, source: impl Into<ComponentSource>, target: impl Into<Param<NodeId>>) -> Self {
        self.push(Command::AddComponent { source: source.into(), target: Some(target.into()) })
    }

    /// Wait until every listed component completed
    ///
    /// Components that were never added anywhere are run on the chain's
    /// owner first.
    pub fn wait_for(self, sources: Vec<ComponentSource>) -> Self {
        self.push(Command::WaitFor { sources, mode: WaitMode::All, active: None })
    }

    /// Wait for a single component
    pub fn wait_for_one(self, source: impl Into<ComponentSource>) -> Self {
        self.wait_for(vec![source.into()])
    }

    /// Wait until one of the listed components completed, then finish the others
    pub fn wait_for_first(self, sources: Vec<ComponentSource>) -> Self {
        self.push(Command::WaitFor { sources, mode: WaitMode::First, active: None })
    }

    /// Wait until `condition` holds
    pub fn wait_until(self, condition: impl Fn(&Scene) -> bool + 'static) -> Self {
        self.push(Command::WaitUntil(Box::new(condition)))
    }

    /// Wait for `frames` updates
    pub fn wait_frames(self, frames: u32) -> Self {
        self.push(Command::WaitFrames { frames, counter: 0 })
    }

    /// Wait until a message with `action` is delivered
    pub fn wait_for_message(self, action: impl Into<String>) -> Self {
        self.push(Command::WaitForMessage { action: action.into(), condition: None, subscribed: false, arrived: false })
    }

    /// Wait until a message with `action` concerning a node matching `condition` is delivered
    pub fn wait_for_message_conditional(self, action: impl Into<String>, condition: QueryCondition) -> Self {
        self.push(Command::WaitForMessage {
            action: action.into(),
            condition: Some(condition),
            subscribed: false,
            arrived: false,
        })
    }

    /// Remove the component called `name` from the chain's owner
    pub fn remove_component(self, name: impl Into<String>) -> Self {
        self.push(Command::RemoveComponent { name: name.into(), target: None })
    }

    /// Remove the component called `name` from `target`
    pub fn remove_component_from(self, name: impl Into<String>, target: NodeId) -> Self {
        self.push(Command::RemoveComponent { name: name.into(), target: Some(target) })
    }

    /// Detach every node matching `query`
    pub fn detach_objects_by_query(self, query: QueryCondition) -> Self {
        self.push(Command::DetachByQuery(query))
    }

    /// Destroy every node matching `query`
    pub fn destroy_objects_by_query(self, query: QueryCondition) -> Self {
        self.push(Command::DestroyByQuery(query))
    }

    /// Detach one node
    pub fn detach_object(self, node: NodeId) -> Self {
        self.push(Command::DetachNode(node))
    }

    /// Destroy one node
    pub fn destroy_object(self, node: NodeId) -> Self {
        self.push(Command::DestroyNode(node))
    }

    // ---------------------------------------------------------------
    // Interpreter
    // ---------------------------------------------------------------

    fn top_scope(&mut self, index: usize) -> Result<&mut Scope> {
        let label = self.commands.get(index).map_or("END", Command::label);
        self.scopes
            .last_mut()
            .ok_or_else(|| SceneError::MalformedChain(format!("{label} at command {index} has no open scope")))
    }

    fn jump_target(&self, index: usize) -> usize {
        self.jumps
            .as_ref()
            .and_then(|jumps| jumps.get(index).copied())
            .unwrap_or(self.commands.len())
    }

    fn step(&mut self, index: usize, ctx: &mut ComponentContext<'_>, absolute: f64) -> Result<Flow> {
        let Some(owner) = ctx.owner() else {
            return Ok(Flow::Block);
        };

        match &mut self.commands[index] {
            Command::BeginRepeat(count) => {
                let count = count.resolve(ctx.scene());
                let remaining = (count > 0).then_some(count);
                self.scopes.push(Scope { begin: index, remaining });
                Ok(Flow::Next)
            }
            Command::EndRepeat => {
                let scope = *self.top_scope(index)?;
                match scope.remaining {
                    None => Ok(Flow::Jump(scope.begin + 1)),
                    Some(left) if left > 1 => {
                        if let Some(top) = self.scopes.last_mut() {
                            top.remaining = Some(left - 1);
                        }
                        Ok(Flow::Jump(scope.begin + 1))
                    }
                    Some(_) => {
                        self.scopes.pop();
                        Ok(Flow::Next)
                    }
                }
            }
            Command::Call(f) => {
                f(ctx)?;
                Ok(Flow::Next)
            }
            Command::BeginWhile(_) => {
                self.scopes.push(Scope { begin: index, remaining: None });
                Ok(Flow::Next)
            }
            Command::EndWhile => {
                let begin = self.top_scope(index)?.begin;
                let again = match &self.commands[begin] {
                    Command::BeginWhile(condition) => condition(ctx.scene_ref()),
                    other => {
                        return Err(SceneError::MalformedChain(format!(
                            "END_WHILE at command {index} closes {}",
                            other.label()
                        )))
                    }
                };
                if again {
                    Ok(Flow::Jump(begin + 1))
                } else {
                    self.scopes.pop();
                    Ok(Flow::Next)
                }
            }
            Command::BeginInterval { period, started } => {
                let period = period.resolve(ctx.scene());
                match *started {
                    None => {
                        *started = Some(absolute);
                        Ok(Flow::Block)
                    }
                    Some(start) if absolute - start >= period => {
                        self.commands[index].reset();
                        self.scopes.push(Scope { begin: index, remaining: None });
                        Ok(Flow::Next)
                    }
                    Some(_) => Ok(Flow::Block),
                }
            }
            Command::EndInterval => {
                let begin = self.top_scope(index)?.begin;
                self.scopes.pop();
                Ok(Flow::Jump(begin))
            }
            Command::BeginIf(condition) => {
                if condition(ctx.scene_ref()) {
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Jump(self.jump_target(index)))
                }
            }
            Command::Else => Ok(Flow::Jump(self.jump_target(index))),
            Command::EndIf => Ok(Flow::Next),
            Command::WaitTime { duration, started } => {
                let duration = duration.resolve(ctx.scene());
                let start = *started.get_or_insert(absolute);
                if absolute - start >= duration {
                    self.commands[index].reset();
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Block)
                }
            }
            Command::AddComponent { source, target } => {
                let target = match target {
                    Some(target) => target.resolve(ctx.scene()),
                    None => owner,
                };
                let id = source.resolve(ctx.scene())?;
                ctx.scene().add_component(target, id)?;
                Ok(Flow::Next)
            }
            Command::WaitFor { sources, mode, active } => {
                let mode = *mode;
                if active.is_none() {
                    let mut ids = Vec::with_capacity(sources.len());
                    for source in sources.iter_mut() {
                        let id = source.resolve(ctx.scene())?;
                        if ctx.scene_ref().component_state(id) == Some(ComponentState::New) {
                            ctx.scene().add_component_and_run(owner, id)?;
                        }
                        ids.push(id);
                    }
                    *active = Some(ids);
                }
                let ids = active.as_deref().unwrap_or_default();
                let scene = ctx.scene_ref();
                let done = match mode {
                    WaitMode::All => ids.iter().all(|id| scene.is_completed(*id)),
                    WaitMode::First => ids.is_empty() || ids.iter().any(|id| scene.is_completed(*id)),
                };
                if !done {
                    return Ok(Flow::Block);
                }
                let ids = active.take().unwrap_or_default();
                if mode == WaitMode::First {
                    for &id in &ids {
                        if !ctx.scene_ref().is_completed(id) {
                            ctx.scene().finish_component(id)?;
                        }
                    }
                }
                // factory output is built per pass and nobody else holds it
                for (source, id) in sources.iter().zip(ids) {
                    let removed = ctx.scene_ref().component_state(id) == Some(ComponentState::Removed);
                    if removed && source.is_factory() {
                        ctx.scene().release_component(id)?;
                    }
                }
                Ok(Flow::Next)
            }
            Command::WaitUntil(condition) => {
                if condition(ctx.scene_ref()) {
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Block)
                }
            }
            Command::WaitFrames { frames, counter } => {
                *counter += 1;
                if *counter > *frames {
                    *counter = 0;
                    Ok(Flow::Next)
                } else {
                    Ok(Flow::Block)
                }
            }
            Command::WaitForMessage { action, subscribed, arrived, .. } => {
                if !*subscribed {
                    *subscribed = true;
                    *arrived = false;
                    ctx.subscribe(action);
                    return Ok(Flow::Block);
                }
                if !*arrived {
                    return Ok(Flow::Block);
                }
                ctx.unsubscribe(action);
                self.commands[index].reset();
                Ok(Flow::Next)
            }
            Command::RemoveComponent { name, target } => {
                let target = target.unwrap_or(owner);
                match ctx.scene_ref().find_component_by_name(target, name) {
                    Some(id) => ctx.scene().remove_component(id)?,
                    None => log::warn!("Chain '{}' found no component '{}' to remove", self.name, name),
                }
                Ok(Flow::Next)
            }
            Command::DetachByQuery(query) => {
                let scene = ctx.scene();
                let root = scene.root();
                for node in scene.find_objects_by_query(query) {
                    if node != root && scene.node(node).is_some() {
                        scene.detach(node)?;
                    }
                }
                Ok(Flow::Next)
            }
            Command::DestroyByQuery(query) => {
                let scene = ctx.scene();
                let root = scene.root();
                for node in scene.find_objects_by_query(query) {
                    if node != root && scene.node(node).is_some() {
                        scene.destroy(node)?;
                    }
                }
                Ok(Flow::Next)
            }
            Command::DetachNode(node) => {
                let node = *node;
                if ctx.scene_ref().node(node).is_some() {
                    ctx.scene().detach(node)?;
                }
                Ok(Flow::Next)
            }
            Command::DestroyNode(node) => {
                let node = *node;
                if ctx.scene_ref().node(node).is_some() {
                    ctx.scene().destroy(node)?;
                }
                Ok(Flow::Next)
            }
        }
    }

    fn is_live(ctx: &ComponentContext<'_>) -> bool {
        ctx.owner().is_some() && ctx.state() == ComponentState::Running && !ctx.is_finishing()
    }
}

impl Component for ChainComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_attach(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.running = true;
        // Detaching dropped every subscription; resume a pending wait
        if let Some(Command::WaitForMessage { action, subscribed: true, .. }) = self.commands.get(self.cursor) {
            ctx.subscribe(action);
        }
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut ComponentContext<'_>, msg: &mut Message) -> Result<Option<Reply>> {
        if let Some(Command::WaitForMessage { action, condition, subscribed: true, arrived }) =
            self.commands.get_mut(self.cursor)
        {
            let matches = action.as_str() == msg.action()
                && condition.as_ref().map_or(true, |condition| {
                    msg.node()
                        .and_then(|node| ctx.scene_ref().node(node))
                        .is_some_and(|node| condition.matches(node))
                });
            if matches {
                *arrived = true;
            }
        }
        Ok(None)
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f64, absolute: f64) -> Result<()> {
        for action in self.lapsed_waits.drain(..) {
            ctx.unsubscribe(&action);
        }
        if self.jumps.is_none() {
            self.jumps = Some(jump_table(&self.commands)?);
        }

        let mut steps = 0;
        while Self::is_live(ctx) {
            if self.abort_conditions.iter().any(|condition| condition(ctx.scene_ref())) {
                log::debug!("Chain '{}' aborted", self.name);
                return ctx.finish();
            }
            if self.cursor >= self.commands.len() {
                return ctx.finish();
            }
            if steps == self.step_limit {
                log::warn!("Chain '{}' hit the step limit of {}, yielding", self.name, self.step_limit);
                return Ok(());
            }
            steps += 1;

            let index = self.cursor;
            log::trace!("Chain '{}' step {} {}", self.name, index, self.commands[index].label());
            match self.step(index, ctx, absolute)? {
                Flow::Next => self.cursor = index + 1,
                Flow::Jump(target) => self.cursor = target,
                Flow::Block => return Ok(()),
            }
        }
        Ok(())
    }

    fn on_detach(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn on_finish(&mut self, _ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.running = false;
        Ok(())
    }
}
