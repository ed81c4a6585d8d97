//! Node queries

use crate::ecs::Node;

/// Conjunction of optional node criteria
///
/// Every criterion that is set must hold; an empty condition matches any
/// node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryCondition {
    /// Exact node name
    pub name: Option<String>,
    /// Required tag
    pub tag: Option<String>,
    /// Required numeric state
    pub state: Option<i32>,
    /// Required flag
    pub flag: Option<u32>,
}

impl QueryCondition {
    /// Condition matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Require a name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Require a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Require a state
    pub fn with_state(mut self, state: i32) -> Self {
        self.state = Some(state);
        self
    }

    /// Require a flag
    pub fn with_flag(mut self, flag: u32) -> Self {
        self.flag = Some(flag);
        self
    }

    /// Check a node against every criterion that is set
    pub fn matches(&self, node: &Node) -> bool {
        self.name.as_deref().map_or(true, |name| node.name() == name)
            && self.tag.as_deref().map_or(true, |tag| node.has_tag(tag))
            && self.state.map_or(true, |state| node.state_id() == state)
            && self.flag.map_or(true, |flag| node.has_flag(flag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::NodeKind;

    fn tagged_node() -> Node {
        let mut node = Node::new(1, "enemy".to_string(), NodeKind::Container, None);
        node.tags.insert("hostile".to_string());
        node.state_id = 3;
        node.flags.set(7);
        node
    }

    #[test]
    fn test_empty_condition_matches_everything() {
        assert!(QueryCondition::new().matches(&tagged_node()));
    }

    #[test]
    fn test_all_criteria_must_hold() {
        let node = tagged_node();
        let condition = QueryCondition::new().with_name("enemy").with_tag("hostile").with_state(3).with_flag(7);
        assert!(condition.matches(&node));
        assert!(!condition.clone().with_flag(8).matches(&node));
        assert!(!QueryCondition::new().with_tag("friendly").matches(&node));
        assert!(!QueryCondition::new().with_name("enemy").with_state(4).matches(&node));
    }
}
