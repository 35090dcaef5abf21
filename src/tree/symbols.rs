use std::collections::BTreeMap;

use super::NodeId;

/// Label to node lookup, the equivalent of a `__symbols__` node.
///
/// The table never owns nodes. [`Tree::delete`](super::Tree::delete) purges
/// every label pointing into the removed subtree, so lookups never return a
/// dead id.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    labels: BTreeMap<String, NodeId>,
}

impl SymbolTable {
    pub fn get(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.labels.iter().map(|(label, id)| (label.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub(super) fn insert(&mut self, label: String, id: NodeId) -> Option<NodeId> {
        self.labels.insert(label, id)
    }

    pub(super) fn remove(&mut self, label: &str) -> Option<NodeId> {
        self.labels.remove(label)
    }
}
