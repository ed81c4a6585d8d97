//! Scene graph trait and implementations

use crate::ecs::NodeId;

/// Observer of structural changes in the entity tree
///
/// Allows pluggable backend mirrors (display lists, spatial trees, etc.)
/// without the scene knowing about them.
pub trait SceneGraph {
    /// `child` was appended under `parent`
    fn on_child_added(&mut self, parent: NodeId, child: NodeId);

    /// `child` was taken out of `parent` and is still alive
    fn on_child_detached(&mut self, parent: NodeId, child: NodeId);

    /// `child` and its subtree were destroyed
    fn on_child_destroyed(&mut self, parent: NodeId, child: NodeId);

    /// Number of direct children known for `parent`
    fn child_count(&self, parent: NodeId) -> usize;

    /// Total number of parent/child links mirrored
    fn entity_count(&self) -> usize;

    /// Forget everything; called when the scene is cleared
    fn clear(&mut self);
}

/// Simple list-based scene graph
///
/// Keeps `(parent, child)` links in insertion order and searches them
/// linearly. Sufficient for small scenes and for tests.
#[derive(Debug, Default)]
pub struct SimpleListGraph {
    links: Vec<(NodeId, NodeId)>,
}

impl SimpleListGraph {
    /// Create a new empty scene graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Children of `parent` in the order they were added
    pub fn children_of(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.links
            .iter()
            .filter(move |(p, _)| *p == parent)
            .map(|(_, child)| *child)
    }
}

impl SceneGraph for SimpleListGraph {
    fn on_child_added(&mut self, parent: NodeId, child: NodeId) {
        self.links.push((parent, child));
    }

    fn on_child_detached(&mut self, parent: NodeId, child: NodeId) {
        self.links.retain(|link| *link != (parent, child));
    }

    fn on_child_destroyed(&mut self, parent: NodeId, child: NodeId) {
        self.on_child_detached(parent, child);
        let mut doomed = vec![child];
        while let Some(node) = doomed.pop() {
            doomed.extend(self.children_of(node));
            self.links.retain(|(p, _)| *p != node);
        }
    }

    fn child_count(&self, parent: NodeId) -> usize {
        self.children_of(parent).count()
    }

    fn entity_count(&self) -> usize {
        self.links.len()
    }

    fn clear(&mut self) {
        self.links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;

    fn ids(count: usize) -> Vec<NodeId> {
        let mut map: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_simple_list_graph_add_detach() {
        let n = ids(3);
        let mut graph = SimpleListGraph::new();
        graph.on_child_added(n[0], n[1]);
        graph.on_child_added(n[0], n[2]);
        assert_eq!(graph.child_count(n[0]), 2);
        assert_eq!(graph.children_of(n[0]).collect::<Vec<_>>(), vec![n[1], n[2]]);

        graph.on_child_detached(n[0], n[1]);
        assert_eq!(graph.entity_count(), 1);
    }

    #[test]
    fn test_destroy_drops_subtree_links() {
        let n = ids(4);
        let mut graph = SimpleListGraph::new();
        graph.on_child_added(n[0], n[1]);
        graph.on_child_added(n[1], n[2]);
        graph.on_child_added(n[2], n[3]);

        graph.on_child_destroyed(n[0], n[1]);
        assert_eq!(graph.entity_count(), 0);
    }

    #[test]
    fn test_clear() {
        let n = ids(2);
        let mut graph = SimpleListGraph::default();
        graph.on_child_added(n[0], n[1]);
        graph.clear();
        assert_eq!(graph.child_count(n[0]), 0);
    }
}
