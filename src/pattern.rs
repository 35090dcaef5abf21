use std::num::NonZeroUsize;

use lru::LruCache;
use regex::Regex;

use crate::error::{LopError, Result};
use crate::selection::{Match, Selection};
use crate::tree::{NodeId, PropertyValue, Tree};

/// A parsed selection pattern: `<path>[:<property>[:<value>]]`.
///
/// An empty path means "the current selection". A path that resolves
/// literally selects that node; otherwise it is an anchored regular
/// expression over node paths.
#[derive(Debug, Clone, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct Pattern {
    raw: String,
    path: Option<String>,
    property: Option<PropertyMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct PropertyMatch {
    name: String,
    value: Option<ValueMatch>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueMatch {
    /// `&label`: the property must reference the same node
    Reference(String),
    /// Anchored regex over the textual atoms of the value
    Regex(String),
}

impl Pattern {
    /// Parse and validate a pattern. Regexes are compiled once here so a
    /// malformed pattern fails when the fragment loads.
    pub fn parse(raw: &str) -> Result<Self> {
        let (path, property) = match raw.split_once(':') {
            Some((path, rest)) => (path, Some(rest)),
            None => (raw, None),
        };

        let path = match path {
            "" => None,
            "/" => Some("/".to_string()),
            path => Some(path.strip_suffix('/').unwrap_or(path).to_string()),
        };

        if let Some(path) = &path {
            if !path.starts_with('/') {
                return Err(LopError::pattern(raw, "node paths must start with `/`"));
            }
            Regex::new(&anchored(path)).map_err(|e| LopError::pattern(raw, e.to_string()))?;
        }

        let property = match property {
            None => None,
            Some(rest) => {
                let (name, value) = match rest.split_once(':') {
                    Some((name, value)) => (name, Some(value)),
                    None => (rest, None),
                };
                if name.is_empty() {
                    return Err(LopError::pattern(raw, "empty property name"));
                }
                let value = match value {
                    None | Some("") => None,
                    Some(value) => match value.strip_prefix('&') {
                        Some(target) => Some(ValueMatch::Reference(target.to_string())),
                        None => {
                            Regex::new(&anchored(value))
                                .map_err(|e| LopError::pattern(raw, e.to_string()))?;
                            Some(ValueMatch::Regex(value.to_string()))
                        }
                    },
                };
                Some(PropertyMatch {
                    name: name.to_string(),
                    value,
                })
            }
        };

        if path.is_none() && property.is_none() {
            return Err(LopError::pattern(raw, "empty pattern"));
        }

        Ok(Self {
            raw: raw.to_string(),
            path,
            property,
        })
    }

    /// Patterns without a path narrow the current selection
    pub fn is_filter(&self) -> bool {
        self.path.is_none()
    }
}

fn anchored(expression: &str) -> String {
    format!("^(?:{expression})$")
}

/// Evaluates patterns against a tree, caching compiled regexes
#[derive(Debug)]
pub struct PatternMatcher {
    cache: LruCache<String, Regex>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    const CACHE_SIZE: usize = 64;

    pub fn new() -> Self {
        let size = NonZeroUsize::new(Self::CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(size),
        }
    }

    fn regex(&mut self, expression: &str) -> Result<&Regex> {
        if !self.cache.contains(expression) {
            let regex = Regex::new(&anchored(expression))
                .map_err(|e| LopError::pattern(expression, e.to_string()))?;
            self.cache.put(expression.to_string(), regex);
        }
        self.cache
            .get(expression)
            .ok_or_else(|| LopError::pattern(expression, "regex cache miss"))
    }

    /// Match a single pattern. `scope` supplies the candidates for a pattern
    /// without a path; it is ignored otherwise.
    pub fn find(&mut self, tree: &Tree, pattern: &Pattern, scope: &Selection) -> Result<Vec<Match>> {
        let candidates = match pattern.path() {
            None => scope.nodes(),
            Some(path) => self.nodes_for_path(tree, path)?,
        };

        let mut matches = vec![];
        for node in candidates {
            match pattern.property() {
                None => matches.push(Match::node_only(node)),
                Some(property) => {
                    if self.property_matches(tree, node, property)? {
                        matches.push(Match::new(node, Some(property.name.clone())));
                    }
                }
            }
        }

        log::debug!("pattern `{}` matched {} node(s)", pattern.raw, matches.len());
        Ok(matches)
    }

    /// Nodes addressed by the path half of a pattern, in document order
    pub fn nodes_for_path(&mut self, tree: &Tree, path: &str) -> Result<Vec<NodeId>> {
        if let Ok(node) = tree.resolve(path) {
            return Ok(vec![node]);
        }

        let regex = self.regex(path)?;
        Ok(tree
            .walk()
            .into_iter()
            .filter(|id| tree.path(*id).is_ok_and(|p| regex.is_match(&p)))
            .collect())
    }

    fn property_matches(&mut self, tree: &Tree, node: NodeId, property: &PropertyMatch) -> Result<bool> {
        let Some(value) = tree.property(node, &property.name) else {
            return Ok(false);
        };

        match &property.value {
            None => Ok(true),
            Some(ValueMatch::Reference(target)) => Ok(references(tree, value, target)),
            Some(ValueMatch::Regex(expression)) => {
                let regex = self.regex(expression)?;
                Ok(value.atoms().iter().any(|atom| regex.is_match(atom)))
            }
        }
    }

    /// Run the passes of one select operation.
    ///
    /// An empty pattern clears the accumulated result. The first pass with a
    /// path replaces `incoming`, later ones union into the result. Passes
    /// without a path filter whatever has been accumulated so far.
    pub fn select(
        &mut self,
        tree: &Tree,
        patterns: &[Option<Pattern>],
        incoming: Selection,
        strict: bool,
    ) -> Result<Selection> {
        let mut selection = incoming;
        let mut replaced = false;

        if patterns.is_empty() {
            selection.clear();
        }

        for pattern in patterns {
            match pattern {
                None => {
                    selection.clear();
                    replaced = true;
                }
                Some(pattern) if pattern.is_filter() => {
                    selection = Selection::from_matches(self.find(tree, pattern, &selection)?);
                    replaced = true;
                }
                Some(pattern) => {
                    let matches = self.find(tree, pattern, &selection)?;
                    if !replaced {
                        selection.clear();
                        replaced = true;
                    }
                    selection.extend(matches);
                }
            }
        }

        // a select made only of empty patterns is a reset and never fails
        let resets_only = patterns.iter().all(Option::is_none);
        if strict && !resets_only && selection.is_empty() {
            let raw = patterns
                .iter()
                .flatten()
                .map(|p| p.raw.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(LopError::NotFound(raw));
        }

        Ok(selection)
    }
}

/// Whether `value` refers to the node `target` names. Both sides are
/// resolved through the tree so different labels for one node compare
/// equal; unresolved references fall back to comparing text.
fn references(tree: &Tree, value: &PropertyValue, target: &str) -> bool {
    let Some(referenced) = value.as_reference() else {
        return false;
    };
    match (tree.resolve_reference(referenced), tree.resolve_reference(target)) {
        (Some(a), Some(b)) => a == b,
        _ => referenced == target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Tree {
        Tree::from_json(
            r#"{
                "children": [
                    { "name": "imux", "labels": ["imux", "imux_alias"] },
                    { "name": "gic", "labels": ["gic"] },
                    { "name": "amba", "children": [
                        { "name": "serial@0", "properties": { "interrupt-parent": "&imux", "status": "okay" } },
                        { "name": "serial@1", "properties": { "interrupt-parent": "&gic", "status": "disabled" } },
                        { "name": "spi@2", "properties": { "interrupt-parent": "&imux_alias" } }
                    ] }
                ]
            }"#,
        )
        .unwrap()
    }

    fn paths(tree: &Tree, selection: &Selection) -> Vec<String> {
        selection.paths(tree)
    }

    #[test]
    fn parses_pattern_parts() {
        let pattern = Pattern::parse("/.*:interrupt-parent:&imux").unwrap();
        assert_eq!(pattern.path().as_deref(), Some("/.*"));
        let property = pattern.property.as_ref().unwrap();
        assert_eq!(property.name, "interrupt-parent");
        assert_eq!(property.value, Some(ValueMatch::Reference("imux".into())));

        assert!(Pattern::parse(":status").unwrap().is_filter());
        assert!(matches!(Pattern::parse("/amba:"), Err(LopError::Pattern { .. })));
        assert!(matches!(Pattern::parse("/amba/(["), Err(LopError::Pattern { .. })));
        assert!(matches!(Pattern::parse("amba"), Err(LopError::Pattern { .. })));
    }

    #[test]
    fn reference_match_resolves_aliases() {
        let tree = tree();
        let mut matcher = PatternMatcher::new();
        let pattern = Pattern::parse("/.*:interrupt-parent:&imux").unwrap();
        let matches = matcher.find(&tree, &pattern, &Selection::new()).unwrap();
        let selection = Selection::from_matches(matches);
        assert_eq!(paths(&tree, &selection), ["/amba/serial@0", "/amba/spi@2"]);
        assert_eq!(
            selection.matches()[0].property().as_deref(),
            Some("interrupt-parent")
        );
    }

    #[test]
    fn literal_path_and_regex_values() {
        let tree = tree();
        let mut matcher = PatternMatcher::new();
        let literal = Pattern::parse("/amba/").unwrap();
        let found = matcher.find(&tree, &literal, &Selection::new()).unwrap();
        assert_eq!(found.len(), 1);

        let status = Pattern::parse("/amba/serial@.*:status:ok.*").unwrap();
        let found = matcher.find(&tree, &status, &Selection::new()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(tree.path(found[0].node()).unwrap(), "/amba/serial@0");
    }

    #[test]
    fn select_passes_accumulate_and_filter() {
        let tree = tree();
        let mut matcher = PatternMatcher::new();
        let parse = |raw: &str| match raw {
            "" => None,
            raw => Some(Pattern::parse(raw).unwrap()),
        };

        let patterns = [parse(""), parse("/amba/serial@.*"), parse("/amba/spi@2")];
        let selection = matcher
            .select(&tree, &patterns, Selection::new(), false)
            .unwrap();
        assert_eq!(
            paths(&tree, &selection),
            ["/amba/serial@0", "/amba/serial@1", "/amba/spi@2"]
        );

        let narrowed = matcher
            .select(&tree, &[parse(":status:disabled")], selection, false)
            .unwrap();
        assert_eq!(paths(&tree, &narrowed), ["/amba/serial@1"]);

        let replaced = matcher
            .select(&tree, &[parse("/gic")], narrowed, false)
            .unwrap();
        assert_eq!(paths(&tree, &replaced), ["/gic"]);
    }

    #[test]
    fn empty_select_clears_even_when_strict() {
        let tree = tree();
        let mut matcher = PatternMatcher::new();
        let full = Selection::from_matches([Match::node_only(tree.root())]);
        let cleared = matcher.select(&tree, &[], full.clone(), false).unwrap();
        assert!(cleared.is_empty());
        let cleared = matcher.select(&tree, &[None], full.clone(), true).unwrap();
        assert!(cleared.is_empty());
        let cleared = matcher.select(&tree, &[], full, true).unwrap();
        assert!(cleared.is_empty());

        let none = [Some(Pattern::parse("/nothing.*").unwrap())];
        assert!(matcher
            .select(&tree, &none, Selection::new(), false)
            .unwrap()
            .is_empty());
        assert!(matcher
            .select(&tree, &none, Selection::new(), true)
            .unwrap_err()
            .is_not_found());
    }
}
