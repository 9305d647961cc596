//! Branch identity for off-mainline nodes.
//!
//! Each variation gets a small positive id, allocated once when the branch is
//! created and never reused. Continuations of a variation share its id so the
//! whole branch lands in one column of the move sheet. Mainline nodes are never
//! stored; the tree reports them as id 0.

use std::collections::HashMap;

use crate::tree::game_tree::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationRegistry {
    ids: HashMap<NodeId, u32>,
    next_id: u32,
}

impl Default for VariationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VariationRegistry {
    pub fn new() -> Self {
        Self {
            ids: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocate a fresh id for a node that starts a new variation.
    pub fn register(&mut self, node: NodeId) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(node, id);
        id
    }

    /// Record that `node` continues the branch identified by `branch_id`.
    pub fn register_continuation(&mut self, node: NodeId, branch_id: u32) {
        self.ids.insert(node, branch_id);
    }

    #[inline]
    pub fn get(&self, node: NodeId) -> Option<u32> {
        self.ids.get(&node).copied()
    }

    /// The id the next `register` call will hand out.
    #[inline]
    pub fn peek_next(&self) -> u32 {
        self.next_id
    }

    /// Number of variations started so far.
    #[inline]
    pub fn branch_count(&self) -> u32 {
        self.next_id - 1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::VariationRegistry;
    use crate::tree::game_tree::NodeId;

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut registry = VariationRegistry::new();
        assert_eq!(registry.register(NodeId::from_index(4)), 1);
        assert_eq!(registry.register(NodeId::from_index(9)), 2);
        assert_eq!(registry.peek_next(), 3);
        assert_eq!(registry.get(NodeId::from_index(4)), Some(1));
        assert_eq!(registry.get(NodeId::from_index(5)), None);
    }

    #[test]
    fn continuations_share_the_branch_id() {
        let mut registry = VariationRegistry::new();
        let id = registry.register(NodeId::from_index(2));
        registry.register_continuation(NodeId::from_index(3), id);
        assert_eq!(registry.get(NodeId::from_index(3)), Some(id));
        assert_eq!(registry.branch_count(), 1);
        assert_eq!(registry.len(), 2);
    }
}
