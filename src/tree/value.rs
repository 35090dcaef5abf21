use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// The value stored under a property name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawValue", into = "RawValue")]
pub enum PropertyValue {
    String(String),
    StringList(Vec<String>),
    Integer(u64),
    IntegerList(Vec<u64>),
    /// A boolean property: present with no value
    Flag,
    /// Reference to another node, either a label or `{/path}`
    Reference(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Flag(bool),
    Integer(u64),
    Text(String),
    Integers(Vec<u64>),
    Strings(Vec<String>),
}

impl TryFrom<RawValue> for PropertyValue {
    type Error = String;

    fn try_from(raw: RawValue) -> Result<Self, Self::Error> {
        Ok(match raw {
            RawValue::Flag(true) => Self::Flag,
            RawValue::Flag(false) => {
                return Err("boolean properties are written as `true`; omit absent ones".into())
            }
            RawValue::Integer(n) => Self::Integer(n),
            RawValue::Text(text) => match text.strip_prefix('&') {
                Some(target) => Self::Reference(target.to_string()),
                None => Self::String(text),
            },
            RawValue::Integers(cells) => Self::IntegerList(cells),
            RawValue::Strings(strings) => Self::StringList(strings),
        })
    }
}

impl From<PropertyValue> for RawValue {
    fn from(value: PropertyValue) -> Self {
        match value {
            PropertyValue::String(s) => RawValue::Text(s),
            PropertyValue::StringList(list) => RawValue::Strings(list),
            PropertyValue::Integer(n) => RawValue::Integer(n),
            PropertyValue::IntegerList(cells) => RawValue::Integers(cells),
            PropertyValue::Flag => RawValue::Flag(true),
            PropertyValue::Reference(target) => RawValue::Text(format!("&{target}")),
        }
    }
}

impl PropertyValue {
    /// Parse the value half of a modify expression.
    ///
    /// `&x` is a reference, `<1 0x2>` a cell list, a bare number an integer,
    /// `"a","b"` a string list and an empty string a flag. Anything else is
    /// taken as a string, with surrounding quotes removed.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::Flag;
        }

        if let Some(target) = text.strip_prefix('&') {
            return Self::Reference(target.to_string());
        }

        if let Some(cells) = text.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
            let parsed = cells
                .split_whitespace()
                .map(parse_integer)
                .collect::<Option<Vec<_>>>();
            if let Some(parsed) = parsed {
                return Self::IntegerList(parsed);
            }
        }

        if let Some(n) = parse_integer(text) {
            return Self::Integer(n);
        }

        if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
            let inner = &text[1..text.len() - 1];
            if inner.contains("\",") {
                return Self::StringList(
                    inner
                        .split("\",")
                        .map(|part| part.trim().trim_matches('"').to_string())
                        .collect(),
                );
            }
            return Self::String(inner.to_string());
        }

        Self::String(text.to_string())
    }

    /// The textual pieces a value pattern is matched against
    pub fn atoms(&self) -> Vec<String> {
        match self {
            Self::String(s) => vec![s.clone()],
            Self::StringList(list) => list.clone(),
            Self::Integer(n) => vec![n.to_string(), format!("{n:#x}")],
            Self::IntegerList(cells) => cells
                .iter()
                .flat_map(|n| [n.to_string(), format!("{n:#x}")])
                .collect(),
            Self::Flag => vec![String::new()],
            Self::Reference(target) => vec![format!("&{target}")],
        }
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Self::Reference(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, Self::Flag)
    }
}

fn parse_integer(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// Backslashes and double quotes are escaped inside dts string literals
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders the right hand side of a dts property assignment
impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "\"{}\"", escape(s)),
            Self::StringList(list) => {
                let quoted = list
                    .iter()
                    .map(|s| format!("\"{}\"", escape(s)))
                    .collect::<Vec<_>>()
                    .join(", ");
                f.write_str(&quoted)
            }
            Self::Integer(n) => write!(f, "<{n:#x}>"),
            Self::IntegerList(cells) => {
                let cells = cells
                    .iter()
                    .map(|n| format!("{n:#x}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                write!(f, "<{cells}>")
            }
            Self::Flag => Ok(()),
            Self::Reference(target) => write!(f, "<&{target}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modify_values() {
        assert_eq!(PropertyValue::parse("&gic"), PropertyValue::Reference("gic".into()));
        assert_eq!(PropertyValue::parse(""), PropertyValue::Flag);
        assert_eq!(PropertyValue::parse("0x20"), PropertyValue::Integer(32));
        assert_eq!(PropertyValue::parse("<1 0x2>"), PropertyValue::IntegerList(vec![1, 2]));
        assert_eq!(
            PropertyValue::parse("\"okay\""),
            PropertyValue::String("okay".into())
        );
        assert_eq!(
            PropertyValue::parse("\"arm,gic-v3\",\"arm,gic\""),
            PropertyValue::StringList(vec!["arm,gic-v3".into(), "arm,gic".into()])
        );
        assert_eq!(
            PropertyValue::parse("disabled"),
            PropertyValue::String("disabled".into())
        );
    }

    #[test]
    fn strings_render_escaped() {
        assert_eq!(
            PropertyValue::String("say \"hi\"".into()).to_string(),
            r#""say \"hi\"""#
        );
        assert_eq!(
            PropertyValue::StringList(vec!["a\\b".into(), "c".into()]).to_string(),
            r#""a\\b", "c""#
        );
    }

    #[test]
    fn json_shapes() {
        let value: PropertyValue = serde_json::from_str("\"&imux\"").unwrap();
        assert_eq!(value, PropertyValue::Reference("imux".into()));
        let value: PropertyValue = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(value, PropertyValue::IntegerList(vec![1, 2]));
        let value: PropertyValue = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(value, PropertyValue::StringList(vec!["a".into(), "b".into()]));
        let value: PropertyValue = serde_json::from_str("true").unwrap();
        assert!(value.is_flag());
        assert!(serde_json::from_str::<PropertyValue>("false").is_err());

        assert_eq!(
            serde_json::to_string(&PropertyValue::Reference("gic".into())).unwrap(),
            "\"&gic\""
        );
    }

    #[test]
    fn dts_rendering() {
        assert_eq!(PropertyValue::Integer(2).to_string(), "<0x2>");
        assert_eq!(PropertyValue::Reference("gic".into()).to_string(), "<&gic>");
        assert_eq!(
            PropertyValue::StringList(vec!["a".into(), "b".into()]).to_string(),
            "\"a\", \"b\""
        );
    }
}
