use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::VariantNames;

use crate::error::{LopError, Result};
use crate::lop::{AssistLop, CodeLop, Lop, LopBody, LopKind, ModifyExpr, ModifyLop, SelectLop};
use crate::pattern::Pattern;

/// A lop fragment as written on disk
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema)]
pub struct FragmentDocument {
    /// Fragment name used in reports. Defaults to the file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Lower priorities run first
    #[serde(default)]
    pub priority: u32,

    /// Operations, executed in the order listed
    #[serde(default)]
    pub lops: Vec<LopDocument>,
}

/// One operation entry
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema)]
pub struct LopDocument {
    /// Defaults to `lop_<index>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Selects the operation kind, e.g. `system-device-tree-v1,lop,select-v1`
    pub compatible: String,

    /// Kind-specific fields: `node`/`id`/`noexec`/`options` for assist,
    /// `select_N` for select, `modify` for modify, `code`/`callback` for code,
    /// and `flags` for any of them
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A loaded fragment: validated, immutable operation records
#[derive(Debug, Clone, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct Fragment {
    name: String,
    #[fieldwork(get(copy))]
    priority: u32,
    lops: Vec<Lop>,
}

impl Fragment {
    pub fn new(name: impl Into<String>, priority: u32, lops: Vec<Lop>) -> Self {
        Self {
            name: name.into(),
            priority,
            lops,
        }
    }

    pub fn from_document(document: FragmentDocument) -> Result<Self> {
        let lops = document
            .lops
            .into_iter()
            .enumerate()
            .map(|(index, lop)| parse_lop(index, lop))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: document.name.unwrap_or_else(|| "fragment".to_string()),
            priority: document.priority,
            lops,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_document(serde_json::from_str(json)?)
    }

    /// Load a fragment file. An unnamed fragment takes the file stem as its name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut document: FragmentDocument = serde_json::from_str(&json)?;
        if document.name.is_none() {
            document.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        log::debug!("loaded {} lop(s) from {}", document.lops.len(), path.display());
        Self::from_document(document)
    }
}

fn parse_lop(index: usize, document: LopDocument) -> Result<Lop> {
    let LopDocument {
        name,
        compatible,
        mut fields,
    } = document;
    let name = name.unwrap_or_else(|| format!("lop_{index}"));

    let kind =
        LopKind::from_compatible(&compatible).ok_or_else(|| LopError::UnsupportedOperation {
            lop: name.clone(),
            compatible: compatible.clone(),
        })?;

    let flags = flags(&name, fields.remove("flags"))?;
    let strict = flags.iter().any(|flag| flag == "strict");

    let body = match kind {
        LopKind::Assist => LopBody::Assist(AssistLop {
            node: required_string(&name, &mut fields, "node")?,
            id: required_string(&name, &mut fields, "id")?,
            noexec: noexec(&name, fields.remove("noexec"))?,
            options: string_list(&name, "options", fields.remove("options"))?,
            strict,
        }),

        LopKind::Select => {
            let mut passes = vec![];
            let keys = fields
                .keys()
                .filter_map(|key| {
                    let number = key.strip_prefix("select_")?.parse::<u32>().ok()?;
                    Some((number, key.clone()))
                })
                .collect::<Vec<_>>();
            for (number, key) in keys {
                let raw = match fields.remove(&key) {
                    Some(Value::String(raw)) => raw,
                    _ => return Err(LopError::malformed(&name, format!("`{key}` must be a string"))),
                };
                passes.push((number, raw));
            }
            passes.sort_by_key(|(number, _)| *number);

            let mut strict = strict;
            let mut patterns = vec![];
            for (_, raw) in passes {
                let raw = match raw.strip_prefix('!') {
                    Some(rest) => {
                        strict = true;
                        rest.to_string()
                    }
                    None => raw,
                };
                patterns.push(match raw.as_str() {
                    "" => None,
                    raw => Some(Pattern::parse(raw)?),
                });
            }
            LopBody::Select(SelectLop { patterns, strict })
        }

        LopKind::Modify => {
            let raw = required_string(&name, &mut fields, "modify")?;
            let (raw, marked) = match raw.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (raw.as_str(), false),
            };
            LopBody::Modify(ModifyLop {
                expression: ModifyExpr::parse(raw)?,
                strict: strict || marked,
                recursive: flags.iter().any(|flag| flag == "recursive"),
            })
        }

        LopKind::Code => LopBody::Code(CodeLop {
            code: required_string(&name, &mut fields, "code")?,
            callback: match fields.remove("callback") {
                None | Some(Value::Null) => None,
                Some(Value::String(callback)) => Some(callback),
                Some(_) => return Err(LopError::malformed(&name, "`callback` must be a string")),
            },
        }),
    };

    for key in fields.keys() {
        log::debug!(
            "{name}: ignoring unknown field `{key}` for {kind} lop (kinds: {})",
            LopKind::VARIANTS.join(", ")
        );
    }

    Ok(Lop::new(name, body))
}

fn required_string(lop: &str, fields: &mut Map<String, Value>, key: &str) -> Result<String> {
    match fields.remove(key) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(LopError::malformed(lop, format!("`{key}` must be a string"))),
        None => Err(LopError::malformed(lop, format!("missing `{key}`"))),
    }
}

fn string_list(lop: &str, key: &str, value: Option<Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(vec![]),
        Some(Value::String(value)) => Ok(vec![value]),
        Some(Value::Array(values)) => values
            .into_iter()
            .map(|value| match value {
                Value::String(value) => Ok(value),
                _ => Err(LopError::malformed(lop, format!("`{key}` entries must be strings"))),
            })
            .collect(),
        Some(_) => Err(LopError::malformed(
            lop,
            format!("`{key}` must be a string or a list of strings"),
        )),
    }
}

/// `flags` is either a list or one string of comma or space separated words
fn flags(lop: &str, value: Option<Value>) -> Result<Vec<String>> {
    Ok(string_list(lop, "flags", value)?
        .iter()
        .flat_map(|flags| flags.split([',', ' ']))
        .filter(|flag| !flag.is_empty())
        .map(str::to_string)
        .collect())
}

/// `noexec` counts when it is `true` or present as an empty string
fn noexec(lop: &str, value: Option<Value>) -> Result<bool> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(false),
        Some(Value::Bool(true)) => Ok(true),
        Some(Value::String(value)) if value.is_empty() => Ok(true),
        Some(_) => Err(LopError::malformed(lop, "`noexec` must be `true` or `\"\"`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_every_kind() {
        let fragment = Fragment::from_json(
            r#"{
                "name": "imux",
                "priority": 5,
                "lops": [
                    { "name": "bind", "compatible": "system-device-tree-v1,lop,assist-v1",
                      "node": "/chosen/openamp", "id": "openamp,xlnx-rpu", "noexec": "" },
                    { "compatible": "system-device-tree-v1,lop,modify",
                      "modify": "/apu-bus/::", "flags": ["strict"] },
                    { "compatible": "system-device-tree-v1,lop,select-v1",
                      "select_2": "/.*:interrupt-parent:&imux", "select_1": "" },
                    { "compatible": "system-device-tree-v1,lop,code-v1",
                      "code": "print('hi')", "callback": "print-selection" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(fragment.name(), "imux");
        assert_eq!(fragment.priority(), 5);
        let lops = fragment.lops();
        assert_eq!(lops.len(), 4);
        assert_eq!(lops[0].name(), "bind");
        assert_eq!(lops[1].name(), "lop_1");

        let LopBody::Assist(assist) = lops[0].body() else {
            panic!("expected assist");
        };
        assert!(assist.noexec);
        assert_eq!(assist.id, "openamp,xlnx-rpu");

        let LopBody::Modify(modify) = lops[1].body() else {
            panic!("expected modify");
        };
        assert!(modify.strict);
        assert!(!modify.recursive);

        let LopBody::Select(select) = lops[2].body() else {
            panic!("expected select");
        };
        assert_eq!(select.patterns.len(), 2);
        assert!(select.patterns[0].is_none());
        assert!(select.patterns[1].is_some());

        let LopBody::Code(code) = lops[3].body() else {
            panic!("expected code");
        };
        assert_eq!(code.reference(), "print-selection");
    }

    #[test]
    fn select_passes_sort_numerically() {
        let fragment = Fragment::from_json(
            r#"{ "lops": [ { "compatible": "system-device-tree-v1,lop,select-v1",
                "select_10": "/b", "select_2": "!/a" } ] }"#,
        )
        .unwrap();
        let LopBody::Select(select) = fragment.lops()[0].body() else {
            panic!("expected select");
        };
        assert!(select.strict);
        let raw = select
            .patterns
            .iter()
            .flatten()
            .map(|p| p.raw())
            .collect::<Vec<_>>();
        assert_eq!(raw, ["/a", "/b"]);
    }

    #[test]
    fn load_failures() {
        let unsupported = Fragment::from_json(
            r#"{ "lops": [ { "compatible": "system-device-tree-v1,lop,conditional-v1" } ] }"#,
        );
        assert!(matches!(
            unsupported,
            Err(LopError::UnsupportedOperation { .. })
        ));

        let missing = Fragment::from_json(
            r#"{ "lops": [ { "compatible": "system-device-tree-v1,lop,modify" } ] }"#,
        );
        assert!(matches!(missing, Err(LopError::Malformed { .. })));

        let bad_pattern = Fragment::from_json(
            r#"{ "lops": [ { "compatible": "system-device-tree-v1,lop,select-v1",
                "select_1": "/amba/([" } ] }"#,
        );
        assert!(matches!(bad_pattern, Err(LopError::Pattern { .. })));

        let bad_modify = Fragment::from_json(
            r#"{ "lops": [ { "compatible": "system-device-tree-v1,lop,modify", "modify": "/a" } ] }"#,
        );
        assert!(matches!(bad_modify, Err(LopError::Pattern { .. })));
    }

    #[test]
    fn flag_strings() {
        assert_eq!(
            flags("lop", Some(Value::String("strict,recursive".into()))).unwrap(),
            ["strict", "recursive"]
        );
        assert!(noexec("lop", Some(Value::Bool(true))).unwrap());
        assert!(!noexec("lop", None).unwrap());
        assert!(noexec("lop", Some(Value::from(1))).is_err());
    }
}
