//! Closure-configured component
//!
//! Handy for small behaviors that don't deserve their own type:
//!
//! ```rust
//! use scene_ecs::components::FuncComponent;
//!
//! let blink = FuncComponent::new("blink")
//!     .with_fixed_frequency(2.0)
//!     .with_duration(3000.0)
//!     .do_on_fixed_update(|ctx, _delta, _absolute| {
//!         if let Some(owner) = ctx.owner() {
//!             ctx.scene().invert_flag(owner, 1)?;
//!         }
//!         Ok(())
//!     });
//! ```

use crate::ecs::{Component, ComponentContext, QueryCondition};
use crate::error::Result;
use crate::events::{actions, Message, Reply};

type Callback = Box<dyn FnMut(&mut ComponentContext<'_>) -> Result<()>>;
type UpdateCallback = Box<dyn FnMut(&mut ComponentContext<'_>, f64, f64) -> Result<()>>;
type MessageCallback = Box<dyn FnMut(&mut ComponentContext<'_>, &mut Message) -> Result<Option<Reply>>>;

struct MessageHandler {
    action: String,
    condition: Option<QueryCondition>,
    once: bool,
    callback: MessageCallback,
}

/// Component whose callbacks are closures
pub struct FuncComponent {
    name: String,
    fixed_frequency: Option<f64>,
    duration: Option<f64>,
    first_run: Option<f64>,
    on_init: Option<Callback>,
    on_attach: Option<Callback>,
    on_detach: Option<Callback>,
    on_remove: Option<Callback>,
    on_finish: Option<Callback>,
    on_update: Option<UpdateCallback>,
    on_fixed_update: Option<UpdateCallback>,
    handlers: Vec<MessageHandler>,
}

impl FuncComponent {
    /// Create a component with no callbacks
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fixed_frequency: None,
            duration: None,
            first_run: None,
            on_init: None,
            on_attach: None,
            on_detach: None,
            on_remove: None,
            on_finish: None,
            on_update: None,
            on_fixed_update: None,
            handlers: Vec::new(),
        }
    }

    /// Fixed-update rate in calls per second
    pub fn with_fixed_frequency(mut self, frequency: f64) -> Self {
        self.fixed_frequency = Some(frequency);
        self
    }

    /// Finish automatically once `duration` ms passed since the first update
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Init callback
    pub fn do_on_init(mut self, f: impl FnMut(&mut ComponentContext<'_>) -> Result<()> + 'static) -> Self {
        self.on_init = Some(Box::new(f));
        self
    }

    /// Attach callback
    pub fn do_on_attach(mut self, f: impl FnMut(&mut ComponentContext<'_>) -> Result<()> + 'static) -> Self {
        self.on_attach = Some(Box::new(f));
        self
    }

    /// Detach callback
    pub fn do_on_detach(mut self, f: impl FnMut(&mut ComponentContext<'_>) -> Result<()> + 'static) -> Self {
        self.on_detach = Some(Box::new(f));
        self
    }

    /// Remove callback
    pub fn do_on_remove(mut self, f: impl FnMut(&mut ComponentContext<'_>) -> Result<()> + 'static) -> Self {
        self.on_remove = Some(Box::new(f));
        self
    }

    /// Finish callback
    pub fn do_on_finish(mut self, f: impl FnMut(&mut ComponentContext<'_>) -> Result<()> + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }

    /// Update callback, receives `(delta, absolute)`
    pub fn do_on_update(mut self, f: impl FnMut(&mut ComponentContext<'_>, f64, f64) -> Result<()> + 'static) -> Self {
        self.on_update = Some(Box::new(f));
        self
    }

    /// Fixed-update callback, receives `(delta, absolute)`
    pub fn do_on_fixed_update(
        mut self,
        f: impl FnMut(&mut ComponentContext<'_>, f64, f64) -> Result<()> + 'static,
    ) -> Self {
        self.on_fixed_update = Some(Box::new(f));
        self
    }

    /// Handle every message with the given action; `actions::ANY` observes all traffic
    pub fn do_on_message(
        self,
        action: impl Into<String>,
        mut f: impl FnMut(&mut ComponentContext<'_>, &mut Message) -> Result<()> + 'static,
    ) -> Self {
        self.handler(action.into(), None, false, Box::new(move |ctx, msg| f(ctx, msg).map(|()| None)))
    }

    /// Handle messages with the given action and reply to the sender
    pub fn do_on_message_reply(
        self,
        action: impl Into<String>,
        f: impl FnMut(&mut ComponentContext<'_>, &mut Message) -> Result<Option<Reply>> + 'static,
    ) -> Self {
        self.handler(action.into(), None, false, Box::new(f))
    }

    /// Handle only the first message with the given action
    pub fn do_on_message_once(
        self,
        action: impl Into<String>,
        mut f: impl FnMut(&mut ComponentContext<'_>, &mut Message) -> Result<()> + 'static,
    ) -> Self {
        self.handler(action.into(), None, true, Box::new(move |ctx, msg| f(ctx, msg).map(|()| None)))
    }

    /// Handle messages whose associated node matches `condition`
    pub fn do_on_message_conditional(
        self,
        action: impl Into<String>,
        condition: QueryCondition,
        mut f: impl FnMut(&mut ComponentContext<'_>, &mut Message) -> Result<()> + 'static,
    ) -> Self {
        self.handler(action.into(), Some(condition), false, Box::new(move |ctx, msg| f(ctx, msg).map(|()| None)))
    }

    fn handler(mut self, action: String, condition: Option<QueryCondition>, once: bool, callback: MessageCallback) -> Self {
        self.handlers.push(MessageHandler { action, condition, once, callback });
        self
    }
}

fn run(callback: &mut Option<Callback>, ctx: &mut ComponentContext<'_>) -> Result<()> {
    callback.as_mut().map_or(Ok(()), |f| f(ctx))
}

impl Component for FuncComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn fixed_frequency(&self) -> Option<f64> {
        self.fixed_frequency
    }

    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        run(&mut self.on_init, ctx)
    }

    fn on_attach(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        for handler in &self.handlers {
            ctx.subscribe(&handler.action);
        }
        run(&mut self.on_attach, ctx)
    }

    fn on_message(&mut self, ctx: &mut ComponentContext<'_>, msg: &mut Message) -> Result<Option<Reply>> {
        let mut reply = None;
        let mut index = 0;
        while index < self.handlers.len() {
            let handler = &mut self.handlers[index];
            let matches = (handler.action == msg.action() || handler.action == actions::ANY)
                && handler.condition.as_ref().map_or(true, |condition| {
                    msg.node()
                        .and_then(|node| ctx.scene_ref().node(node))
                        .is_some_and(|node| condition.matches(node))
                });
            if !matches {
                index += 1;
                continue;
            }
            let result = (handler.callback)(ctx, msg)?;
            reply = reply.or(result);
            if handler.once {
                let action = self.handlers.remove(index).action;
                if !self.handlers.iter().any(|h| h.action == action) {
                    ctx.unsubscribe(&action);
                }
            } else {
                index += 1;
            }
        }
        Ok(reply)
    }

    fn on_update(&mut self, ctx: &mut ComponentContext<'_>, delta: f64, absolute: f64) -> Result<()> {
        if let Some(duration) = self.duration {
            let first_run = *self.first_run.get_or_insert(absolute);
            if absolute - first_run >= duration {
                return ctx.finish();
            }
        }
        match self.on_update.as_mut() {
            Some(f) => f(ctx, delta, absolute),
            None => Ok(()),
        }
    }

    fn on_fixed_update(&mut self, ctx: &mut ComponentContext<'_>, delta: f64, absolute: f64) -> Result<()> {
        match self.on_fixed_update.as_mut() {
            Some(f) => f(ctx, delta, absolute),
            None => Ok(()),
        }
    }

    fn on_detach(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        run(&mut self.on_detach, ctx)
    }

    fn on_remove(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        run(&mut self.on_remove, ctx)
    }

    fn on_finish(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        self.first_run = None;
        run(&mut self.on_finish, ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::ecs::{ComponentState, Scene};
    use crate::events::Reply;

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_duration_finishes_component() {
        let mut scene = Scene::default();
        let root = scene.root();
        let finished = counter();
        let sink = Rc::clone(&finished);
        let id = scene
            .spawn_component(
                root,
                FuncComponent::new("timed").with_duration(100.0).do_on_finish(move |_| {
                    sink.set(sink.get() + 1);
                    Ok(())
                }),
            )
            .unwrap();

        for frame in 1..=5 {
            scene.update(20.0, f64::from(frame) * 20.0).unwrap();
        }
        assert_eq!(scene.component_state(id), Some(ComponentState::Running));
        scene.update(20.0, 120.0).unwrap();
        assert_eq!(scene.component_state(id), Some(ComponentState::Removed));
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_expiring_component_still_sees_its_owner() {
        let mut scene = Scene::default();
        let root = scene.root();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (on_finish, on_detach) = (Rc::clone(&seen), Rc::clone(&seen));
        scene
            .spawn_component(
                root,
                FuncComponent::new("timed")
                    .with_duration(10.0)
                    .do_on_finish(move |ctx| {
                        on_finish.borrow_mut().push((ctx.owner(), ctx.state()));
                        Ok(())
                    })
                    .do_on_detach(move |ctx| {
                        on_detach.borrow_mut().push((ctx.owner(), ctx.state()));
                        Ok(())
                    }),
            )
            .unwrap();

        scene.update(20.0, 20.0).unwrap();
        scene.update(20.0, 40.0).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(Some(root), ComponentState::Running), (Some(root), ComponentState::Finished)]
        );
    }

    #[test]
    fn test_message_once_unsubscribes() {
        let mut scene = Scene::default();
        let root = scene.root();
        let hits = counter();
        let sink = Rc::clone(&hits);
        let id = scene
            .spawn_component_and_run(
                root,
                FuncComponent::new("once").do_on_message_once("HIT", move |_, _| {
                    sink.set(sink.get() + 1);
                    Ok(())
                }),
            )
            .unwrap();

        scene.emit("HIT", None).unwrap();
        scene.emit("HIT", None).unwrap();
        assert_eq!(hits.get(), 1);
        assert!(!scene.is_subscribed(id, "HIT"));
    }

    #[test]
    fn test_conditional_handler_checks_node() {
        let mut scene = Scene::default();
        let root = scene.root();
        let enemy = scene.create_node("enemy");
        scene.add_child(root, enemy).unwrap();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&hits);
        scene
            .spawn_component_and_run(
                root,
                FuncComponent::new("watcher").do_on_message_conditional(
                    "DIED",
                    QueryCondition::new().with_name("enemy"),
                    move |_, msg| {
                        sink.borrow_mut().push(msg.node());
                        Ok(())
                    },
                ),
            )
            .unwrap();

        let mut msg = Message::new("DIED").with_node(root);
        scene.send_message(&mut msg, None).unwrap();
        let mut msg = Message::new("DIED").with_node(enemy);
        scene.send_message(&mut msg, None).unwrap();
        scene.emit("DIED", None).unwrap();
        assert_eq!(*hits.borrow(), vec![Some(enemy)]);
    }

    #[test]
    fn test_reply_handler() {
        let mut scene = Scene::default();
        let root = scene.root();
        scene
            .spawn_component_and_run(
                root,
                FuncComponent::new("oracle").do_on_message_reply("ASK", |_, _| Ok(Some(Reply::data(42_u8)))),
            )
            .unwrap();

        let msg = scene.emit("ASK", None).unwrap();
        assert!(msg.responses.is_success());
        assert_eq!(msg.responses.data::<u8>(), Some(&42));
    }

    #[test]
    fn test_handlers_resubscribe_after_reattach() {
        let mut scene = Scene::default();
        let root = scene.root();
        let holder = scene.create_node("holder");
        scene.add_child(root, holder).unwrap();
        let hits = counter();
        let sink = Rc::clone(&hits);
        scene
            .spawn_component_and_run(
                holder,
                FuncComponent::new("listener").do_on_message("PING", move |_, _| {
                    sink.set(sink.get() + 1);
                    Ok(())
                }),
            )
            .unwrap();

        scene.detach(holder).unwrap();
        scene.emit("PING", None).unwrap();
        scene.add_child(root, holder).unwrap();
        scene.emit("PING", None).unwrap();
        assert_eq!(hits.get(), 1);
    }
}
