//! Per-frame update pass and deferred invocations
//!
//! One call to [`Scene::update`] walks the tree depth-first, parents before
//! children. For each node it flushes the pending buffer, updates running
//! components in insertion order (including ones run immediately during the
//! pass) and fires fixed updates whose interval has elapsed. After the tree,
//! pending invocations are drained from the end of the queue.

use std::collections::HashSet;

use crate::ecs::{ComponentId, ComponentState, NodeId, Scene};
use crate::error::{Result, SceneError};

/// Callback scheduled with [`Scene::call_with_delay`]
pub struct Invocation {
    delay: f64,
    elapsed: f64,
    action: Box<dyn FnOnce(&mut Scene) -> Result<()>>,
}

impl Invocation {
    /// Remaining time until the invocation fires, in milliseconds
    pub fn remaining(&self) -> f64 {
        (self.delay - self.elapsed).max(0.0)
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("delay", &self.delay)
            .field("elapsed", &self.elapsed)
            .finish_non_exhaustive()
    }
}

impl Scene {
    /// Advance the scene by one frame
    ///
    /// `absolute` must not decrease between calls and `delta` must not be
    /// negative. Errors from component callbacks abort the pass and are
    /// returned unchanged.
    pub fn update(&mut self, delta: f64, absolute: f64) -> Result<()> {
        if self.is_updating {
            return Err(SceneError::ReentrantUpdate);
        }
        self.scene_cleared = false;
        self.current_delta = delta;
        self.current_absolute = absolute;

        self.is_updating = true;
        let result = self.update_node(self.root, delta, absolute);
        self.is_updating = false;
        result?;

        self.run_invocations(delta)
    }

    fn update_node(&mut self, id: NodeId, delta: f64, absolute: f64) -> Result<()> {
        self.init_pending_components(id)?;

        // Components run immediately during this pass are picked up by the
        // next round; removed ones are skipped by `update_component`.
        let mut visited = HashSet::new();
        loop {
            let Some(node) = self.nodes.get(id) else {
                return Ok(());
            };
            let batch: Vec<ComponentId> = node
                .components
                .iter()
                .copied()
                .filter(|component| !visited.contains(component))
                .collect();
            if batch.is_empty() {
                break;
            }
            for component in batch {
                visited.insert(component);
                self.update_component(id, component, delta, absolute)?;
            }
        }

        let mut visited = HashSet::new();
        loop {
            let Some(node) = self.nodes.get(id) else {
                return Ok(());
            };
            let batch: Vec<NodeId> = node
                .children
                .iter()
                .copied()
                .filter(|child| !visited.contains(child))
                .collect();
            if batch.is_empty() {
                break;
            }
            for child in batch {
                visited.insert(child);
                let still_child = self
                    .nodes
                    .get(child)
                    .is_some_and(|node| node.parent == Some(id) && node.is_on_scene());
                if still_child {
                    self.update_node(child, delta, absolute)?;
                }
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.last_absolute = absolute;
        }
        Ok(())
    }

    fn is_running_on(&self, id: ComponentId, node: NodeId) -> bool {
        self.components
            .get(id)
            .is_some_and(|slot| slot.owner == Some(node) && slot.state == ComponentState::Running)
    }

    /// Update one component and fire its fixed update when due
    pub(crate) fn update_component(&mut self, node: NodeId, id: ComponentId, delta: f64, absolute: f64) -> Result<()> {
        if !self.is_running_on(id, node) {
            return Ok(());
        }
        self.invoke(id, |behavior, ctx| behavior.on_update(ctx, delta, absolute))?;

        if !self.is_running_on(id, node) {
            return Ok(());
        }
        let Some(slot) = self.components.get_mut(id) else {
            return Ok(());
        };
        let Some(frequency) = slot.behavior.as_deref().and_then(|behavior| behavior.fixed_frequency()) else {
            return Ok(());
        };
        if frequency <= 0.0 {
            return Ok(());
        }
        // At most one fixed update per frame; the timestamp jumps to now
        let elapsed = absolute - slot.last_fixed_update;
        if elapsed >= 1000.0 / frequency {
            slot.last_fixed_update = absolute;
            self.invoke(id, |behavior, ctx| behavior.on_fixed_update(ctx, elapsed, absolute))?;
        }
        Ok(())
    }

    /// Run `action` once `delay` milliseconds of scene time have elapsed
    ///
    /// A zero delay fires at the end of the current frame when scheduled
    /// during an update, otherwise at the end of the next one.
    pub fn call_with_delay(&mut self, delay: f64, action: impl FnOnce(&mut Scene) -> Result<()> + 'static) {
        self.invocations.push(Invocation {
            delay,
            elapsed: 0.0,
            action: Box::new(action),
        });
    }

    /// Number of invocations still waiting
    pub fn pending_invocations(&self) -> usize {
        self.invocations.len()
    }

    fn run_invocations(&mut self, delta: f64) -> Result<()> {
        let mut index = self.invocations.len();
        while index > 0 {
            index -= 1;
            let Some(invocation) = self.invocations.get_mut(index) else {
                continue;
            };
            invocation.elapsed += delta;
            if invocation.elapsed < invocation.delay {
                continue;
            }
            let invocation = self.invocations.remove(index);
            (invocation.action)(self)?;
            if self.scene_cleared {
                log::debug!("Scene cleared, dropping the remaining invocations");
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use approx::assert_relative_eq;

    use crate::ecs::{Component, ComponentContext, Scene};
    use crate::error::{Result, SceneError};

    struct Ticker {
        frequency: f64,
        updates: Rc<Cell<u32>>,
        fixed: Rc<RefCell<Vec<f64>>>,
    }

    impl Component for Ticker {
        fn fixed_frequency(&self) -> Option<f64> {
            Some(self.frequency)
        }

        fn on_update(&mut self, _ctx: &mut ComponentContext<'_>, _delta: f64, _absolute: f64) -> Result<()> {
            self.updates.set(self.updates.get() + 1);
            Ok(())
        }

        fn on_fixed_update(&mut self, _ctx: &mut ComponentContext<'_>, delta: f64, _absolute: f64) -> Result<()> {
            self.fixed.borrow_mut().push(delta);
            Ok(())
        }
    }

    fn ticker(scene: &mut Scene, frequency: f64) -> (Rc<Cell<u32>>, Rc<RefCell<Vec<f64>>>) {
        let updates = Rc::new(Cell::new(0));
        let fixed = Rc::new(RefCell::new(Vec::new()));
        let root = scene.root();
        scene
            .spawn_component(root, Ticker { frequency, updates: Rc::clone(&updates), fixed: Rc::clone(&fixed) })
            .unwrap();
        (updates, fixed)
    }

    #[test]
    fn test_fixed_update_waits_one_interval() {
        let mut scene = Scene::default();
        let (updates, fixed) = ticker(&mut scene, 10.0);

        for frame in 1..=25 {
            scene.update(10.0, f64::from(frame) * 10.0).unwrap();
        }
        assert_eq!(updates.get(), 25);
        // interval 100 ms over 250 ms of scene time
        assert_eq!(fixed.borrow().len(), 2);
        assert_relative_eq!(fixed.borrow()[0], 100.0);
    }

    #[test]
    fn test_fixed_update_at_most_once_per_frame() {
        let mut scene = Scene::default();
        let (_, fixed) = ticker(&mut scene, 100.0);

        scene.update(16.0, 16.0).unwrap();
        assert!(fixed.borrow().is_empty());
        scene.update(500.0, 516.0).unwrap();
        assert_eq!(fixed.borrow().len(), 1);
        assert_relative_eq!(fixed.borrow()[0], 500.0);
    }

    #[test]
    fn test_zero_delay_fires_same_frame() {
        let mut scene = Scene::default();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        scene.call_with_delay(0.0, move |_| {
            flag.set(true);
            Ok(())
        });
        assert_eq!(scene.pending_invocations(), 1);
        scene.update(16.0, 16.0).unwrap();
        assert!(fired.get());
        assert_eq!(scene.pending_invocations(), 0);
    }

    #[test]
    fn test_delayed_invocation_fires_after_sixtieth_tick() {
        let mut scene = Scene::default();
        let fired_at = Rc::new(Cell::new(0_u32));
        let frames = Rc::new(Cell::new(0_u32));
        let (sink, counter) = (Rc::clone(&fired_at), Rc::clone(&frames));
        scene.call_with_delay(1000.0, move |_| {
            sink.set(counter.get());
            Ok(())
        });

        let mut absolute = 0.0;
        for frame in 1..=70 {
            frames.set(frame);
            absolute += 16.67;
            scene.update(16.67, absolute).unwrap();
        }
        assert_eq!(fired_at.get(), 60);
    }

    #[test]
    fn test_clear_drops_remaining_invocations() {
        let mut scene = Scene::default();
        let late = Rc::new(Cell::new(false));
        let flag = Rc::clone(&late);
        scene.call_with_delay(0.0, move |_| {
            flag.set(true);
            Ok(())
        });
        scene.call_with_delay(0.0, |scene| scene.clear_scene(None));

        scene.update(16.0, 16.0).unwrap();
        assert!(!late.get());
        assert_eq!(scene.pending_invocations(), 0);
    }

    #[test]
    fn test_update_is_not_reentrant() {
        struct Nested;
        impl Component for Nested {
            fn on_update(&mut self, ctx: &mut ComponentContext<'_>, delta: f64, absolute: f64) -> Result<()> {
                ctx.scene().update(delta, absolute)
            }
        }

        let mut scene = Scene::default();
        let root = scene.root();
        scene.spawn_component(root, Nested).unwrap();
        assert!(matches!(scene.update(16.0, 16.0), Err(SceneError::ReentrantUpdate)));
        assert!(!scene.is_updating());
    }

    #[test]
    fn test_clear_during_update_is_rejected() {
        struct Clearer;
        impl Component for Clearer {
            fn on_update(&mut self, ctx: &mut ComponentContext<'_>, _delta: f64, _absolute: f64) -> Result<()> {
                ctx.scene().clear_scene(None)
            }
        }

        let mut scene = Scene::default();
        let root = scene.root();
        scene.spawn_component(root, Clearer).unwrap();
        assert!(matches!(scene.update(16.0, 16.0), Err(SceneError::ClearDuringUpdate)));
    }
}
