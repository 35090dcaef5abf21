use std::fmt::{self, Display, Formatter};

use super::{NodeId, Tree};

const INDENT: &str = "    ";

/// dts rendering of a tree, produced by [`Tree::dts`]
#[derive(Debug, Clone, Copy)]
pub struct Dts<'a>(&'a Tree);

impl Tree {
    /// Render the tree as dts-like source.
    ///
    /// This is an output and preview format only; it is never parsed back.
    pub fn to_dts(&self) -> String {
        self.dts().to_string()
    }

    pub fn dts(&self) -> Dts<'_> {
        Dts(self)
    }
}

impl Display for Dts<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("/dts-v1/;\n\n")?;
        self.write_node(self.0.root(), 0, f)
    }
}

impl Dts<'_> {
    fn write_node(&self, id: NodeId, depth: usize, f: &mut Formatter<'_>) -> fmt::Result {
        let tree = self.0;
        let indent = INDENT.repeat(depth);
        let name = match tree.parent(id) {
            Some(_) => tree.name(id).unwrap_or_default(),
            None => "/",
        };

        f.write_str(&indent)?;
        for label in tree.labels(id).unwrap_or_default() {
            write!(f, "{label}: ")?;
        }
        writeln!(f, "{name} {{")?;

        if let Ok(properties) = tree.properties(id) {
            for (property, value) in properties {
                if value.is_flag() {
                    writeln!(f, "{indent}{INDENT}{property};")?;
                } else {
                    writeln!(f, "{indent}{INDENT}{property} = {value};")?;
                }
            }
        }

        for child in tree.children(id).unwrap_or_default() {
            self.write_node(*child, depth + 1, f)?;
        }

        writeln!(f, "{indent}}};")
    }
}

#[cfg(test)]
mod tests {
    use crate::tree::{PropertyValue, Tree};

    #[test]
    fn renders_labels_properties_and_children() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.set_property(root, "#address-cells", PropertyValue::Integer(2))
            .unwrap();
        let gic = tree.add_node(root, "interrupt-controller@e2000000").unwrap();
        tree.add_label(gic, "gic").unwrap();
        tree.set_property(gic, "interrupt-controller", PropertyValue::Flag)
            .unwrap();

        assert_eq!(
            tree.to_dts(),
            "/dts-v1/;\n\n\
             / {\n\
             \x20   #address-cells = <0x2>;\n\
             \x20   gic: interrupt-controller@e2000000 {\n\
             \x20       interrupt-controller;\n\
             \x20   };\n\
             };\n"
        );
    }

    #[test]
    fn quoted_strings_stay_one_literal() {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.set_property(root, "model", PropertyValue::String(r#"board "rev\b""#.into()))
            .unwrap();
        assert!(tree
            .to_dts()
            .contains(r#"    model = "board \"rev\\b\"";"#));
    }
}
