use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{NodeId, PropertyValue, Tree};
use crate::error::Result;

/// Serialized form of a node and its subtree.
///
/// This is the structured stand-in for dts source: the engine reads and
/// writes trees in this shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDocument {
    /// Node name; the root may use `""` or `"/"`
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDocument>,
}

impl Tree {
    pub fn from_document(document: &NodeDocument) -> Result<Self> {
        let mut tree = Self::new();
        let root = tree.root();
        tree.fill(root, document)?;
        Ok(tree)
    }

    fn fill(&mut self, id: NodeId, document: &NodeDocument) -> Result<()> {
        for label in &document.labels {
            self.add_label(id, label)?;
        }
        for (name, value) in &document.properties {
            self.set_property(id, name, value.clone())?;
        }
        for child in &document.children {
            let child_id = self.add_node(id, &child.name)?;
            self.fill(child_id, child)?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: NodeDocument = serde_json::from_str(json)?;
        Self::from_document(&document)
    }

    pub fn to_document(&self) -> NodeDocument {
        self.document_for(self.root())
    }

    fn document_for(&self, id: NodeId) -> NodeDocument {
        let name = match self.parent(id) {
            Some(_) => self.name(id).unwrap_or_default().to_string(),
            None => "/".to_string(),
        };
        NodeDocument {
            name,
            labels: self.labels(id).map(<[_]>::to_vec).unwrap_or_default(),
            properties: self.properties(id).cloned().unwrap_or_default(),
            children: self
                .children(id)
                .unwrap_or_default()
                .iter()
                .map(|child| self.document_for(*child))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"{
        "name": "/",
        "properties": { "#address-cells": 2 },
        "children": [
            {
                "name": "imux",
                "labels": ["imux"],
                "properties": { "interrupt-controller": true }
            },
            {
                "name": "serial@ff000000",
                "properties": {
                    "compatible": ["arm,pl011", "arm,primecell"],
                    "interrupt-parent": "&imux",
                    "reg": [0, 4278190080, 0, 4096]
                }
            }
        ]
    }"##;

    #[test]
    fn loads_and_reexports() {
        let tree = Tree::from_json(SAMPLE).unwrap();
        assert_eq!(tree.len(), 3);
        let serial = tree.resolve("/serial@ff000000").unwrap();
        assert_eq!(
            tree.property(serial, "interrupt-parent"),
            Some(&PropertyValue::Reference("imux".into()))
        );
        assert_eq!(tree.label("imux").unwrap(), tree.resolve("/imux").unwrap());

        let document = tree.to_document();
        let reloaded = Tree::from_document(&document).unwrap();
        assert_eq!(reloaded.to_document(), document);
    }

    #[test]
    fn duplicate_children_are_rejected() {
        let json = r#"{ "children": [ { "name": "a" }, { "name": "a" } ] }"#;
        assert!(Tree::from_json(json).is_err());
    }
}
