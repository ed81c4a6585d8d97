//! Wildcard message observer used when debugging is enabled

use std::collections::HashMap;

use crate::ecs::{Component, ComponentContext};
use crate::error::Result;
use crate::events::{actions, Message, Reply};

/// Logs every message delivered on the scene and keeps per-action counts
#[derive(Debug, Default)]
pub struct DebugComponent {
    counts: HashMap<String, usize>,
    total: usize,
}

impl DebugComponent {
    /// Create an observer with empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages seen so far
    pub fn message_count(&self) -> usize {
        self.total
    }

    /// Number of messages seen for one action
    pub fn count_of(&self, action: &str) -> usize {
        self.counts.get(action).copied().unwrap_or(0)
    }
}

impl Component for DebugComponent {
    fn on_init(&mut self, ctx: &mut ComponentContext<'_>) -> Result<()> {
        ctx.subscribe(actions::ANY);
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut ComponentContext<'_>, msg: &mut Message) -> Result<Option<Reply>> {
        self.total += 1;
        *self.counts.entry(msg.action().to_string()).or_insert(0) += 1;

        let node = msg
            .node()
            .and_then(|id| ctx.scene_ref().node(id))
            .map_or("-", |node| node.name());
        log::debug!("[{}] {} on '{}'", self.total, msg.action(), node);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SceneConfig;
    use crate::ecs::Scene;

    #[test]
    fn test_debug_scene_counts_notifications() {
        let mut scene = Scene::new("debug", SceneConfig::default().with_debug(true));
        let root = scene.root();
        let debug = scene.find_component_by_name(root, "DebugComponent").unwrap();

        let node = scene.create_node("ship");
        scene.add_child(root, node).unwrap();
        scene.emit("CUSTOM", None).unwrap();

        let observer = scene.component::<DebugComponent>(debug).unwrap();
        assert_eq!(observer.count_of(actions::OBJECT_ADDED), 1);
        assert_eq!(observer.count_of("CUSTOM"), 1);
        assert_eq!(observer.message_count(), 2);
    }

    #[test]
    fn test_no_observer_without_debug() {
        let scene = Scene::default();
        assert!(scene.find_component_by_name(scene.root(), "DebugComponent").is_none());
    }
}
