use crate::tree::{NodeId, Tree};

/// One matched node, with the property that matched when the pattern had a
/// property part
#[derive(Debug, Clone, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct Match {
    #[fieldwork(get(copy))]
    node: NodeId,
    property: Option<String>,
}

impl Match {
    pub fn new(node: NodeId, property: Option<String>) -> Self {
        Self { node, property }
    }

    pub fn node_only(node: NodeId) -> Self {
        Self::new(node, None)
    }
}

/// The nodes matched by the most recent select, in first-match order and
/// without duplicates.
///
/// A selection is threaded explicitly from one executor step to the next and
/// never outlives a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    matches: Vec<Match>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_matches(matches: impl IntoIterator<Item = Match>) -> Self {
        let mut selection = Self::new();
        selection.extend(matches);
        selection
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn nodes(&self) -> Vec<NodeId> {
        self.matches.iter().map(Match::node).collect()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.matches.iter().any(|m| m.node == node)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Add a match unless its node is already selected
    pub fn push(&mut self, m: Match) -> bool {
        if self.contains(m.node) {
            false
        } else {
            self.matches.push(m);
            true
        }
    }

    pub fn extend(&mut self, matches: impl IntoIterator<Item = Match>) {
        for m in matches {
            self.push(m);
        }
    }

    pub fn remove(&mut self, node: NodeId) -> bool {
        let before = self.matches.len();
        self.matches.retain(|m| m.node != node);
        before != self.matches.len()
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }

    /// Drop matches whose node no longer exists
    pub fn prune(&mut self, tree: &Tree) -> usize {
        let before = self.matches.len();
        self.matches.retain(|m| tree.contains(m.node));
        before - self.matches.len()
    }

    /// Paths of the selected nodes, for logging and reports
    pub fn paths(&self, tree: &Tree) -> Vec<String> {
        self.matches
            .iter()
            .filter_map(|m| tree.path(m.node).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_first_match_order_without_duplicates() {
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.add_node(root, "a").unwrap();
        let b = tree.add_node(root, "b").unwrap();

        let mut selection = Selection::from_matches([Match::node_only(b), Match::node_only(a)]);
        assert!(!selection.push(Match::new(b, Some("status".into()))));
        assert_eq!(selection.nodes(), [b, a]);
        assert_eq!(selection.matches()[0].property(), None);

        tree.delete(b).unwrap();
        assert_eq!(selection.prune(&tree), 1);
        assert_eq!(selection.paths(&tree), ["/a"]);
    }
}
