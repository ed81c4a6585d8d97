//! Chain commands and their parameters

use crate::ecs::{Component, ComponentContext, ComponentId, NodeId, QueryCondition, Scene};
use crate::error::{Result, SceneError};

/// Predicate evaluated against the scene
pub type Condition = Box<dyn Fn(&Scene) -> bool>;

/// Callback run by a CALL command
pub type ChainCall = Box<dyn FnMut(&mut ComponentContext<'_>) -> Result<()>>;

/// Command parameter: a literal or a factory evaluated when the command runs
pub enum Param<T> {
    /// Fixed value
    Value(T),
    /// Evaluated lazily against the scene
    Factory(Box<dyn FnMut(&mut Scene) -> T>),
}

impl<T> Param<T> {
    /// Wrap a factory closure
    pub fn factory(f: impl FnMut(&mut Scene) -> T + 'static) -> Self {
        Self::Factory(Box::new(f))
    }
}

impl<T: Clone> Param<T> {
    pub(crate) fn resolve(&mut self, scene: &mut Scene) -> T {
        match self {
            Self::Value(value) => value.clone(),
            Self::Factory(f) => f(scene),
        }
    }
}

impl<T> From<T> for Param<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

/// Parameter resolved once and cached until [`Lazy::reset`]
pub(crate) struct Lazy<T> {
    param: Param<T>,
    cached: Option<T>,
}

impl<T: Clone> Lazy<T> {
    pub(crate) fn new(param: Param<T>) -> Self {
        Self { param, cached: None }
    }

    pub(crate) fn resolve(&mut self, scene: &mut Scene) -> T {
        if let Some(value) = &self.cached {
            return value.clone();
        }
        let value = self.param.resolve(scene);
        self.cached = Some(value.clone());
        value
    }

    pub(crate) fn reset(&mut self) {
        self.cached = None;
    }
}

/// Where a chain gets the components it adds or waits for
pub enum ComponentSource {
    /// Behavior owned by the chain; registered on first use and reused on later passes
    Instance(Option<Box<dyn Component>>),
    /// Component already registered with the scene
    Registered(ComponentId),
    /// Builds a fresh behavior on every pass
    Factory(Box<dyn FnMut(&mut Scene) -> Box<dyn Component>>),
}

impl ComponentSource {
    /// Behavior registered on first use
    pub fn instance(component: impl Component) -> Self {
        Self::Instance(Some(Box::new(component)))
    }

    /// Factory producing a new behavior on every pass
    pub fn factory<C: Component>(mut f: impl FnMut(&mut Scene) -> C + 'static) -> Self {
        Self::Factory(Box::new(move |scene| Box::new(f(scene))))
    }

    pub(crate) fn is_factory(&self) -> bool {
        matches!(self, Self::Factory(_))
    }

    pub(crate) fn resolve(&mut self, scene: &mut Scene) -> Result<ComponentId> {
        if let Self::Instance(behavior) = self {
            if let Some(behavior) = behavior.take() {
                *self = Self::Registered(scene.register_boxed(behavior));
            }
        }
        match self {
            Self::Registered(id) => Ok(*id),
            Self::Factory(f) => {
                let behavior = f(scene);
                Ok(scene.register_boxed(behavior))
            }
            Self::Instance(_) => Err(SceneError::MalformedChain("component instance was lost".into())),
        }
    }
}

impl From<ComponentId> for ComponentSource {
    fn from(id: ComponentId) -> Self {
        Self::Registered(id)
    }
}

/// How many awaited components must complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitMode {
    All,
    First,
}

pub(crate) enum Command {
    BeginRepeat(Param<u32>),
    EndRepeat,
    Call(ChainCall),
    BeginWhile(Condition),
    EndWhile,
    BeginInterval { period: Lazy<f64>, started: Option<f64> },
    EndInterval,
    BeginIf(Condition),
    Else,
    EndIf,
    WaitTime { duration: Lazy<f64>, started: Option<f64> },
    AddComponent { source: ComponentSource, target: Option<Param<NodeId>> },
    WaitFor { sources: Vec<ComponentSource>, mode: WaitMode, active: Option<Vec<ComponentId>> },
    WaitUntil(Condition),
    WaitFrames { frames: u32, counter: u32 },
    WaitForMessage { action: String, condition: Option<QueryCondition>, subscribed: bool, arrived: bool },
    RemoveComponent { name: String, target: Option<NodeId> },
    DetachByQuery(QueryCondition),
    DestroyByQuery(QueryCondition),
    DetachNode(NodeId),
    DestroyNode(NodeId),
}

impl Command {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::BeginRepeat(_) => "BEGIN_REPEAT",
            Self::EndRepeat => "END_REPEAT",
            Self::Call(_) => "CALL",
            Self::BeginWhile(_) => "BEGIN_WHILE",
            Self::EndWhile => "END_WHILE",
            Self::BeginInterval { .. } => "BEGIN_INTERVAL",
            Self::EndInterval => "END_INTERVAL",
            Self::BeginIf(_) => "BEGIN_IF",
            Self::Else => "ELSE",
            Self::EndIf => "END_IF",
            Self::WaitTime { .. } => "WAIT_TIME",
            Self::AddComponent { .. } => "ADD_COMPONENT",
            Self::WaitFor { mode: WaitMode::All, .. } => "WAIT_FOR_ALL_TO_FINISH",
            Self::WaitFor { mode: WaitMode::First, .. } => "WAIT_FOR_FIRST_TO_FINISH",
            Self::WaitUntil(_) => "WAIT_UNTIL",
            Self::WaitFrames { .. } => "WAIT_FRAMES",
            Self::WaitForMessage { .. } => "WAIT_FOR_MESSAGE",
            Self::RemoveComponent { .. } => "REMOVE_COMPONENT",
            Self::DetachByQuery(_) => "DETACH_GAME_OBJECTS_BY_QUERY",
            Self::DestroyByQuery(_) => "DESTROY_GAME_OBJECTS_BY_QUERY",
            Self::DetachNode(_) => "DETACH_GAME_OBJECT",
            Self::DestroyNode(_) => "DESTROY_GAME_OBJECT",
        }
    }

    /// Forget per-visit progress
    pub(crate) fn reset(&mut self) {
        match self {
            Self::BeginInterval { period, started } => {
                period.reset();
                *started = None;
            }
            Self::WaitTime { duration, started } => {
                duration.reset();
                *started = None;
            }
            Self::WaitFor { active, .. } => *active = None,
            Self::WaitFrames { counter, .. } => *counter = 0,
            Self::WaitForMessage { subscribed, arrived, .. } => {
                *subscribed = false;
                *arrived = false;
            }
            _ => {}
        }
    }
}

#[derive(Clone, Copy)]
enum Block {
    Repeat,
    While,
    Interval,
    If { begin: usize, otherwise: Option<usize> },
}

/// Check block nesting and compute where IF and ELSE jump to
///
/// A false BEGIN_IF jumps past its ELSE (or END_IF); an ELSE reached by
/// falling through jumps past its END_IF. Blocks left open at the end of
/// the list are allowed; an unterminated IF jumps to the end.
pub(crate) fn jump_table(commands: &[Command]) -> Result<Vec<usize>> {
    let mut jumps = vec![0; commands.len()];
    let mut open: Vec<Block> = Vec::new();

    let mismatch = |index: usize, command: &Command| {
        SceneError::MalformedChain(format!("unexpected {} at command {}", command.label(), index))
    };

    for (index, command) in commands.iter().enumerate() {
        match command {
            Command::BeginRepeat(_) => open.push(Block::Repeat),
            Command::BeginWhile(_) => open.push(Block::While),
            Command::BeginInterval { .. } => open.push(Block::Interval),
            Command::BeginIf(_) => open.push(Block::If { begin: index, otherwise: None }),
            Command::EndRepeat => match open.pop() {
                Some(Block::Repeat) => {}
                _ => return Err(mismatch(index, command)),
            },
            Command::EndWhile => match open.pop() {
                Some(Block::While) => {}
                _ => return Err(mismatch(index, command)),
            },
            Command::EndInterval => match open.pop() {
                Some(Block::Interval) => {}
                _ => return Err(mismatch(index, command)),
            },
            Command::Else => match open.last_mut() {
                Some(Block::If { begin, otherwise }) if otherwise.is_none() => {
                    jumps[*begin] = index + 1;
                    *otherwise = Some(index);
                }
                _ => return Err(mismatch(index, command)),
            },
            Command::EndIf => match open.pop() {
                Some(Block::If { begin, otherwise }) => match otherwise {
                    Some(otherwise) => jumps[otherwise] = index + 1,
                    None => jumps[begin] = index + 1,
                },
                _ => return Err(mismatch(index, command)),
            },
            _ => {}
        }
    }

    for block in open {
        if let Block::If { begin, otherwise } = block {
            match otherwise {
                Some(otherwise) => jumps[otherwise] = commands.len(),
                None => jumps[begin] = commands.len(),
            }
        }
    }
    Ok(jumps)
}
