use std::fmt::{self, Display, Formatter};

use strum::{Display as StrumDisplay, EnumString, VariantNames};

use crate::error::{LopError, Result};
use crate::pattern::Pattern;

/// The operation vocabulary understood by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, VariantNames, StrumDisplay)]
#[strum(serialize_all = "snake_case")]
pub enum LopKind {
    Assist,
    Select,
    Modify,
    Code,
}

impl LopKind {
    /// Derive the kind from a `compatible` string such as
    /// `system-device-tree-v1,lop,select-v1`
    pub fn from_compatible(compatible: &str) -> Option<Self> {
        let (_, kind) = compatible.rsplit_once(",lop,")?;
        let kind = match kind.rsplit_once("-v") {
            Some((name, version)) if version.chars().all(|c| c.is_ascii_digit()) => name,
            _ => kind,
        };
        kind.parse().ok()
    }
}

/// One immutable operation record
#[derive(Debug, Clone, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct Lop {
    name: String,
    body: LopBody,
}

impl Lop {
    pub fn new(name: impl Into<String>, body: LopBody) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    pub fn kind(&self) -> LopKind {
        match self.body {
            LopBody::Assist(_) => LopKind::Assist,
            LopBody::Select(_) => LopKind::Select,
            LopBody::Modify(_) => LopKind::Modify,
            LopBody::Code(_) => LopKind::Code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LopBody {
    Assist(AssistLop),
    Select(SelectLop),
    Modify(ModifyLop),
    Code(CodeLop),
}

/// Bind an external assist to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistLop {
    /// Path or `&label` of the target node
    pub node: String,
    pub id: String,
    /// Record the binding but never run it inline
    pub noexec: bool,
    pub options: Vec<String>,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectLop {
    /// Passes in `select_N` order. `None` is an empty pattern, which clears.
    pub patterns: Vec<Option<Pattern>>,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyLop {
    pub expression: ModifyExpr,
    pub strict: bool,
    /// Property removal also applies to every descendant
    pub recursive: bool,
}

/// Hand the tree and selection to a registered callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLop {
    /// Opaque snippet body
    pub code: String,
    /// Explicit registry key; the trimmed `code` is used when absent
    pub callback: Option<String>,
}

impl CodeLop {
    pub fn reference(&self) -> &str {
        self.callback.as_deref().unwrap_or_else(|| self.code.trim())
    }
}

/// `source:property:value`, where an empty property makes it the node form
/// `source::destination`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyExpr {
    pub source: String,
    pub property: String,
    pub value: String,
}

impl ModifyExpr {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.splitn(3, ':');
        let (Some(source), Some(property), Some(value)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(LopError::pattern(
                raw,
                "expected `source:property:value` or `source::destination`",
            ));
        };

        if source.is_empty() && property.is_empty() && value.is_empty() {
            return Err(LopError::pattern(raw, "nothing to modify"));
        }
        if source.starts_with('/') {
            Pattern::parse(source)?;
        }
        if property.is_empty() && value.starts_with('/') {
            crate::tree::split_path(value)?;
        }

        Ok(Self {
            source: source.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        })
    }

    pub fn is_node_operation(&self) -> bool {
        self.property.is_empty()
    }
}

impl Display for ModifyExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.property, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_compatible() {
        assert_eq!(
            LopKind::from_compatible("system-device-tree-v1,lop,select-v1"),
            Some(LopKind::Select)
        );
        assert_eq!(
            LopKind::from_compatible("system-device-tree-v1,lop,modify"),
            Some(LopKind::Modify)
        );
        assert_eq!(
            LopKind::from_compatible("system-device-tree-v1,lop,assist-v1"),
            Some(LopKind::Assist)
        );
        assert_eq!(
            LopKind::from_compatible("system-device-tree-v1,lop,code-v1"),
            Some(LopKind::Code)
        );
        assert_eq!(
            LopKind::from_compatible("system-device-tree-v1,lop,conditional-v1"),
            None
        );
        assert_eq!(LopKind::from_compatible("xlnx,xform,modify"), None);
        assert_eq!(LopKind::Assist.to_string(), "assist");
    }

    #[test]
    fn modify_expressions() {
        let rename = ModifyExpr::parse(
            "/apu-bus/interrupt-controller@e2000000::/axi/interrupt-controller@e2000000",
        )
        .unwrap();
        assert!(rename.is_node_operation());
        assert_eq!(rename.source, "/apu-bus/interrupt-controller@e2000000");
        assert_eq!(rename.value, "/axi/interrupt-controller@e2000000");

        let delete = ModifyExpr::parse("/apu-bus/::").unwrap();
        assert_eq!(delete.source, "/apu-bus/");
        assert!(delete.value.is_empty());

        let property = ModifyExpr::parse(":interrupt-parent:&gic").unwrap();
        assert!(!property.is_node_operation());
        assert_eq!(property.property, "interrupt-parent");
        assert_eq!(property.value, "&gic");

        let with_colon = ModifyExpr::parse("/chosen:bootargs:console=ttyPS0:115200").unwrap();
        assert_eq!(with_colon.value, "console=ttyPS0:115200");

        assert!(matches!(ModifyExpr::parse("/a"), Err(LopError::Pattern { .. })));
        assert!(matches!(ModifyExpr::parse("::"), Err(LopError::Pattern { .. })));
        assert!(matches!(ModifyExpr::parse("/a:://b"), Err(LopError::Path { .. })));
    }
}
