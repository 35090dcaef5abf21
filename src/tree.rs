mod document;
mod dts;
mod symbols;
mod value;

use std::collections::BTreeMap;

pub use document::NodeDocument;
pub use dts::Dts;
pub use symbols::SymbolTable;
pub use value::PropertyValue;

use crate::error::{LopError, Result};

/// Stable handle to a node. Ids are never reused, so a handle to a deleted
/// node stays dead instead of aliasing a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    properties: BTreeMap<String, PropertyValue>,
    labels: Vec<String>,
}

impl NodeData {
    fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            parent,
            children: vec![],
            properties: BTreeMap::new(),
            labels: vec![],
        }
    }
}

/// In-memory device tree.
///
/// Nodes live in an arena and are linked to their parent; paths are always
/// computed from those links rather than stored.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<NodeData>>,
    symbols: SymbolTable,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    const ROOT: NodeId = NodeId(0);

    /// A tree holding only the root node
    pub fn new() -> Self {
        Self {
            nodes: vec![Some(NodeData::new("", None))],
            symbols: SymbolTable::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn data(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| LopError::NotFound(format!("node #{}", id.0)))
    }

    fn data_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| LopError::NotFound(format!("node #{}", id.0)))
    }

    pub fn name(&self, id: NodeId) -> Result<&str> {
        Ok(&self.data(id)?.name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).ok()?.parent
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId]> {
        Ok(&self.data(id)?.children)
    }

    pub fn properties(&self, id: NodeId) -> Result<&BTreeMap<String, PropertyValue>> {
        Ok(&self.data(id)?.properties)
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&PropertyValue> {
        self.data(id).ok()?.properties.get(name)
    }

    pub fn labels(&self, id: NodeId) -> Result<&[String]> {
        Ok(&self.data(id)?.labels)
    }

    /// Absolute path of a node, rebuilt from the parent links
    pub fn path(&self, id: NodeId) -> Result<String> {
        let mut segments = vec![];
        let mut current = id;
        loop {
            let data = self.data(current)?;
            match data.parent {
                Some(parent) => {
                    segments.push(data.name.as_str());
                    current = parent;
                }
                None => break,
            }
        }
        segments.reverse();
        Ok(format!("/{}", segments.join("/")))
    }

    fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.data(parent)
            .ok()?
            .children
            .iter()
            .copied()
            .find(|child| self.name(*child).is_ok_and(|n| n == name))
    }

    /// Resolve an absolute path, or `&label`, to a node.
    pub fn resolve(&self, path: &str) -> Result<NodeId> {
        if let Some(target) = path.strip_prefix('&') {
            return self
                .resolve_reference(target)
                .ok_or_else(|| LopError::NotFound(path.to_string()));
        }

        let segments = split_path(path)?;
        self.resolve_segments(Self::ROOT, &segments)
            .ok_or_else(|| LopError::NotFound(path.to_string()))
    }

    /// Resolve a path relative to `base`. `relative` must not start with `/`.
    pub fn resolve_from(&self, base: NodeId, relative: &str) -> Result<NodeId> {
        let trimmed = relative.trim_end_matches('/');
        let segments = trimmed.split('/').collect::<Vec<_>>();
        if trimmed.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(LopError::path(relative, "malformed relative path"));
        }
        self.resolve_segments(base, &segments)
            .ok_or_else(|| LopError::NotFound(relative.to_string()))
    }

    fn resolve_segments(&self, base: NodeId, segments: &[&str]) -> Option<NodeId> {
        segments
            .iter()
            .try_fold(base, |current, segment| self.child(current, segment))
    }

    /// Resolve the target of a reference value: a label, or `{/path}`.
    pub fn resolve_reference(&self, target: &str) -> Option<NodeId> {
        match target.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
            Some(path) => self.resolve(path).ok(),
            None => self.symbols.get(target),
        }
    }

    pub fn label(&self, label: &str) -> Result<NodeId> {
        self.symbols
            .get(label)
            .ok_or_else(|| LopError::NotFound(format!("&{label}")))
    }

    /// Create a new, empty child node
    pub fn add_node(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        validate_name(name)?;
        if self.child(parent, name).is_some() {
            let path = join_path(&self.path(parent)?, name);
            return Err(LopError::path(path, "node already exists"));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(NodeData::new(name, Some(parent))));
        self.data_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub fn add_label(&mut self, id: NodeId, label: &str) -> Result<()> {
        self.data(id)?;
        match self.symbols.get(label) {
            Some(existing) if existing == id => return Ok(()),
            Some(existing) => {
                return Err(LopError::DuplicateLabel {
                    label: label.to_string(),
                    path: self.path(existing)?,
                })
            }
            None => {}
        }
        self.symbols.insert(label.to_string(), id);
        self.data_mut(id)?.labels.push(label.to_string());
        Ok(())
    }

    pub fn remove_label(&mut self, label: &str) -> Option<NodeId> {
        let id = self.symbols.remove(label)?;
        if let Ok(data) = self.data_mut(id) {
            data.labels.retain(|l| l != label);
        }
        Some(id)
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.parent(id) {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    /// Move and/or rename a node. Labels, properties and children travel
    /// with it.
    pub fn rename(&mut self, id: NodeId, new_path: &str) -> Result<()> {
        if id == Self::ROOT {
            return Err(LopError::path(new_path, "the root node cannot be renamed"));
        }
        self.data(id)?;

        let segments = split_path(new_path)?;
        let Some((name, parent_segments)) = segments.split_last() else {
            return Err(LopError::path(new_path, "the root path is always taken"));
        };

        let parent = self
            .resolve_segments(Self::ROOT, parent_segments)
            .ok_or_else(|| LopError::path(new_path, "parent node does not exist"))?;

        if parent == id || self.is_ancestor(id, parent) {
            return Err(LopError::path(new_path, "a node cannot move beneath itself"));
        }

        match self.child(parent, name) {
            Some(existing) if existing == id => return Ok(()),
            Some(_) => return Err(LopError::path(new_path, "node already exists")),
            None => {}
        }

        let old_parent = self.data(id)?.parent;
        if old_parent != Some(parent) {
            if let Some(old_parent) = old_parent {
                self.data_mut(old_parent)?.children.retain(|c| *c != id);
            }
            self.data_mut(parent)?.children.push(id);
        }

        let data = self.data_mut(id)?;
        data.name = name.to_string();
        data.parent = Some(parent);
        Ok(())
    }

    /// Remove a node and its subtree, purging every label that pointed into
    /// it. Returns the number of nodes removed.
    pub fn delete(&mut self, id: NodeId) -> Result<usize> {
        if id == Self::ROOT {
            return Err(LopError::path("/", "the root node cannot be deleted"));
        }
        let parent = self.data(id)?.parent;

        let subtree = self.walk_from(id);
        for node in &subtree {
            if let Some(data) = self.nodes[node.0].take() {
                for label in data.labels {
                    self.symbols.remove(&label);
                }
            }
        }

        if let Some(parent) = parent {
            self.data_mut(parent)?.children.retain(|c| *c != id);
        }

        Ok(subtree.len())
    }

    pub fn set_property(
        &mut self,
        id: NodeId,
        name: &str,
        value: PropertyValue,
    ) -> Result<Option<PropertyValue>> {
        Ok(self.data_mut(id)?.properties.insert(name.to_string(), value))
    }

    /// Remove a property, returning its previous value if it was present
    pub fn delete_property(&mut self, id: NodeId, name: &str) -> Result<Option<PropertyValue>> {
        Ok(self.data_mut(id)?.properties.remove(name))
    }

    /// Every live node in document (pre-)order
    pub fn walk(&self) -> Vec<NodeId> {
        self.walk_from(Self::ROOT)
    }

    pub fn walk_from(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = vec![];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Ok(data) = self.data(current) else {
                continue;
            };
            out.push(current);
            stack.extend(data.children.iter().rev().copied());
        }
        out
    }

    /// Nodes that carry a property, whatever its value
    pub fn nodes_with_property(&self, name: &str) -> Vec<NodeId> {
        self.walk()
            .into_iter()
            .filter(|id| self.property(*id, name).is_some())
            .collect()
    }
}

/// Split an absolute path into segments. A trailing `/` is ignored.
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(LopError::path(path, "paths must start with `/`"));
    };
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok(vec![]);
    }

    let segments = rest.split('/').collect::<Vec<_>>();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(LopError::path(path, "empty path segment"));
    }
    Ok(segments)
}

pub(crate) fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(LopError::path(name, "invalid node name"));
    }
    Ok(())
}
