use std::fmt::{self, Display, Formatter};

use crate::assist::{AssistBinding, AssistRegistry};
use crate::callback::CallbackRegistry;
use crate::error::{LopError, Result, RunError};
use crate::fragment::Fragment;
use crate::lop::{AssistLop, CodeLop, Lop, LopBody, ModifyExpr, ModifyLop, SelectLop};
use crate::pattern::PatternMatcher;
use crate::selection::Selection;
use crate::tree::{join_path, NodeId, PropertyValue, Tree};

/// Driver-level switches that shape how a fragment executes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Treat every operation as strict
    pub strict: bool,
    /// Log callback failures and keep going instead of aborting the pass
    pub continue_on_error: bool,
    /// Run assists inline unless the lop says `noexec`
    pub auto_assist: bool,
}

impl ExecOptions {
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_auto_assist(mut self, auto_assist: bool) -> Self {
        self.auto_assist = auto_assist;
        self
    }
}

/// What one operation did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LopOutcome {
    AssistRan { id: String, node: String },
    AssistDeferred { id: String, node: String },
    Selected(usize),
    Renamed { from: String, to: String },
    Deleted(String),
    PropertySet { node: String, property: String },
    PropertyRemoved { node: String, property: String },
    Modified(Vec<LopOutcome>),
    Called { callback: String, selected: usize },
    CallbackFailed { callback: String, message: String },
    Skipped(String),
}

impl Display for LopOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssistRan { id, node } => write!(f, "ran assist {id} on {node}"),
            Self::AssistDeferred { id, node } => write!(f, "deferred assist {id} on {node}"),
            Self::Selected(count) => write!(f, "selected {count} node(s)"),
            Self::Renamed { from, to } => write!(f, "renamed {from} to {to}"),
            Self::Deleted(path) => write!(f, "deleted {path}"),
            Self::PropertySet { node, property } => write!(f, "set {property} on {node}"),
            Self::PropertyRemoved { node, property } => {
                write!(f, "removed {property} from {node}")
            }
            Self::Modified(changes) => {
                let changes = changes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                f.write_str(&changes)
            }
            Self::Called { callback, selected } => {
                write!(f, "called {callback} with {selected} selected node(s)")
            }
            Self::CallbackFailed { message, .. } => write!(f, "{message} (continuing)"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// Per-fragment log of what each operation did
#[derive(Debug, Clone, Default, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct RunReport {
    fragment: String,
    entries: Vec<(String, LopOutcome)>,
}

impl Display for RunReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "fragment {}:", self.fragment)?;
        for (lop, outcome) in &self.entries {
            writeln!(f, "  {lop}: {outcome}")?;
        }
        Ok(())
    }
}

/// Executes the operations of a fragment, in order, against one tree
pub struct Executor<'a> {
    assists: &'a mut AssistRegistry,
    callbacks: &'a CallbackRegistry,
    matcher: PatternMatcher,
    options: ExecOptions,
}

impl<'a> Executor<'a> {
    pub fn new(
        assists: &'a mut AssistRegistry,
        callbacks: &'a CallbackRegistry,
        options: ExecOptions,
    ) -> Self {
        Self {
            assists,
            callbacks,
            matcher: PatternMatcher::new(),
            options,
        }
    }

    /// Run every operation of `fragment`.
    ///
    /// On failure the remaining operations are skipped but everything already
    /// applied stays applied.
    pub fn run(&mut self, tree: &mut Tree, fragment: &Fragment) -> Result<RunReport, RunError> {
        let mut report = RunReport {
            fragment: fragment.name().to_string(),
            entries: vec![],
        };
        let mut selection = Selection::new();

        for (index, lop) in fragment.lops().iter().enumerate() {
            log::trace!("{}: {} `{}`", fragment.name(), lop.kind(), lop.name());
            match self.step(tree, lop, selection) {
                Ok((next, outcome)) => {
                    log::debug!("{}: {outcome}", lop.name());
                    report.entries.push((lop.name().to_string(), outcome));
                    selection = next;
                }
                Err(error) => {
                    log::error!("{}: {error}", lop.name());
                    return Err(RunError {
                        lop: lop.name().to_string(),
                        index,
                        applied: index,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Apply one operation. The selection goes in by value and the one the
    /// next operation should see comes back out.
    pub fn step(
        &mut self,
        tree: &mut Tree,
        lop: &Lop,
        selection: Selection,
    ) -> Result<(Selection, LopOutcome)> {
        match lop.body() {
            LopBody::Assist(assist) => self.assist(tree, assist, selection),
            LopBody::Select(select) => self.select(tree, select, selection),
            LopBody::Modify(modify) => self.modify(tree, modify, selection),
            LopBody::Code(code) => self.code(tree, code, selection),
        }
    }

    fn assist(
        &mut self,
        tree: &mut Tree,
        lop: &AssistLop,
        mut selection: Selection,
    ) -> Result<(Selection, LopOutcome)> {
        let node = match tree.resolve(&lop.node) {
            Ok(node) => node,
            Err(e) if e.is_not_found() && !(lop.strict || self.options.strict) => {
                log::warn!("assist `{}` target {} not found", lop.id, lop.node);
                return Ok((selection, LopOutcome::Skipped(format!("{} not found", lop.node))));
            }
            Err(e) => return Err(e),
        };

        let path = tree.path(node)?;
        let binding = AssistBinding::new(&lop.id, node, lop.options.clone());

        if lop.noexec || !self.options.auto_assist {
            self.assists.defer(binding);
            return Ok((
                selection,
                LopOutcome::AssistDeferred {
                    id: lop.id.clone(),
                    node: path,
                },
            ));
        }

        self.assists.run(tree, &binding)?;
        selection.prune(tree);
        Ok((
            selection,
            LopOutcome::AssistRan {
                id: lop.id.clone(),
                node: path,
            },
        ))
    }

    fn select(
        &mut self,
        tree: &mut Tree,
        lop: &SelectLop,
        selection: Selection,
    ) -> Result<(Selection, LopOutcome)> {
        let strict = lop.strict || self.options.strict;
        let selection = self.matcher.select(tree, &lop.patterns, selection, strict)?;
        let count = selection.len();
        Ok((selection, LopOutcome::Selected(count)))
    }

    /// Nodes a modify expression's source addresses. A pattern never hands
    /// the root to a node operation; only the literal `/` does.
    fn modify_targets(
        &mut self,
        tree: &Tree,
        expression: &ModifyExpr,
        selection: &Selection,
    ) -> Result<Vec<NodeId>> {
        let source = expression.source.as_str();
        if source.is_empty() {
            return Ok(selection.nodes());
        }
        if source.starts_with('&') {
            return Ok(tree.resolve(source).ok().into_iter().collect());
        }
        if source.starts_with('/') {
            let path = match source {
                "/" => source,
                _ => source.strip_suffix('/').unwrap_or(source),
            };
            let mut nodes = self.matcher.nodes_for_path(tree, path)?;
            if expression.is_node_operation() && path != "/" {
                nodes.retain(|node| *node != tree.root());
            }
            return Ok(nodes);
        }

        let mut targets = vec![];
        for base in selection.nodes() {
            match tree.resolve_from(base, source) {
                Ok(node) if !targets.contains(&node) => targets.push(node),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(targets)
    }

    fn modify(
        &mut self,
        tree: &mut Tree,
        lop: &ModifyLop,
        mut selection: Selection,
    ) -> Result<(Selection, LopOutcome)> {
        let expression = &lop.expression;
        let strict = lop.strict || self.options.strict;
        let targets = self.modify_targets(tree, expression, &selection)?;

        if targets.is_empty() {
            if strict {
                return Err(LopError::NotFound(expression.to_string()));
            }
            log::warn!("modify `{expression}` matched nothing");
            return Ok((
                selection,
                LopOutcome::Skipped(format!("`{expression}` matched nothing")),
            ));
        }

        let mut changes = vec![];
        for target in targets {
            // deleting an ancestor earlier in this loop can take a target with it
            if !tree.contains(target) {
                continue;
            }
            let path = tree.path(target)?;

            if expression.is_node_operation() {
                if expression.value.is_empty() {
                    tree.delete(target)?;
                    log::info!("deleted {path}");
                    changes.push(LopOutcome::Deleted(path));
                    continue;
                }

                let destination = if expression.value.starts_with('/') {
                    expression.value.clone()
                } else {
                    let parent = tree
                        .parent(target)
                        .ok_or_else(|| LopError::path(&path, "the root node cannot be renamed"))?;
                    join_path(&tree.path(parent)?, &expression.value)
                };
                let destination = match destination.as_str() {
                    "/" => destination,
                    d => d.strip_suffix('/').unwrap_or(d).to_string(),
                };

                if destination != path {
                    tree.rename(target, &destination)?;
                    log::info!("renamed {path} to {destination}");
                    changes.push(LopOutcome::Renamed {
                        from: path,
                        to: destination,
                    });
                }
            } else if expression.value.is_empty() {
                let nodes = if lop.recursive {
                    tree.walk_from(target)
                } else {
                    vec![target]
                };
                for node in nodes {
                    if tree.delete_property(node, &expression.property)?.is_some() {
                        let node = tree.path(node)?;
                        log::info!("removed {} from {node}", expression.property);
                        changes.push(LopOutcome::PropertyRemoved {
                            node,
                            property: expression.property.clone(),
                        });
                    }
                }
            } else {
                let value = PropertyValue::parse(&expression.value);
                tree.set_property(target, &expression.property, value)?;
                log::info!("set {} on {path}", expression.property);
                changes.push(LopOutcome::PropertySet {
                    node: path,
                    property: expression.property.clone(),
                });
            }
        }

        selection.prune(tree);
        Ok((selection, LopOutcome::Modified(changes)))
    }

    fn code(
        &mut self,
        tree: &mut Tree,
        lop: &CodeLop,
        selection: Selection,
    ) -> Result<(Selection, LopOutcome)> {
        let reference = lop.reference();
        let fallback = selection.clone();
        let selected = selection.len();

        match self.callbacks.invoke(reference, &lop.code, tree, selection) {
            Ok(selection) => Ok((
                selection,
                LopOutcome::Called {
                    callback: reference.to_string(),
                    selected,
                },
            )),
            Err(error) if self.options.continue_on_error => {
                log::error!("{error}");
                let mut selection = fallback;
                selection.prune(tree);
                Ok((
                    selection,
                    LopOutcome::CallbackFailed {
                        callback: reference.to_string(),
                        message: error.to_string(),
                    },
                ))
            }
            Err(error) => Err(error),
        }
    }
}
