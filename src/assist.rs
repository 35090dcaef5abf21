use anyhow::Result;

use crate::error::LopError;
use crate::tree::{NodeId, PropertyValue, Tree};

/// Everything an assist receives when it runs
pub struct AssistContext<'a> {
    pub tree: &'a mut Tree,
    /// The node the assist was bound to
    pub node: NodeId,
    pub id: &'a str,
    pub options: &'a [String],
}

/// An externally implemented handler for assist operations
pub trait Assist {
    /// Whether this handler implements the given assist id
    fn is_compat(&self, id: &str) -> bool;

    fn run(&self, context: &mut AssistContext<'_>) -> Result<()>;
}

/// A recorded association between an assist id and a node
#[derive(Debug, Clone, PartialEq, Eq, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct AssistBinding {
    id: String,
    #[fieldwork(get(copy))]
    node: NodeId,
    options: Vec<String>,
}

impl AssistBinding {
    pub fn new(id: impl Into<String>, node: NodeId, options: Vec<String>) -> Self {
        Self {
            id: id.into(),
            node,
            options,
        }
    }
}

/// Assist handlers plus the bindings still waiting to run
#[derive(Default)]
pub struct AssistRegistry {
    handlers: Vec<Box<dyn Assist>>,
    pending: Vec<AssistBinding>,
}

impl std::fmt::Debug for AssistRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistRegistry")
            .field("handlers", &self.handlers.len())
            .field("pending", &self.pending)
            .finish()
    }
}

impl AssistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The assists the command line tool ships with
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(NoAccessPrune);
        registry
    }

    pub fn register(&mut self, assist: impl Assist + 'static) {
        self.handlers.push(Box::new(assist));
    }

    pub fn lookup(&self, id: &str) -> Option<&dyn Assist> {
        self.handlers
            .iter()
            .find(|handler| handler.is_compat(id))
            .map(|handler| &**handler)
    }

    /// Record a binding to be run later by the driver
    pub fn defer(&mut self, binding: AssistBinding) {
        log::debug!("deferring assist `{}`", binding.id);
        self.pending.push(binding);
    }

    pub fn pending(&self) -> &[AssistBinding] {
        &self.pending
    }

    /// Run one binding now
    pub fn run(&self, tree: &mut Tree, binding: &AssistBinding) -> Result<(), LopError> {
        let handler = self
            .lookup(&binding.id)
            .ok_or_else(|| LopError::UnknownAssist(binding.id.clone()))?;
        let node_path = tree.path(binding.node)?;
        log::info!("running assist `{}` on {node_path}", binding.id);

        let mut context = AssistContext {
            tree,
            node: binding.node,
            id: &binding.id,
            options: &binding.options,
        };
        handler
            .run(&mut context)
            .map_err(|source| LopError::Assist {
                id: binding.id.clone(),
                node: node_path,
                source: source.into(),
            })
    }

    /// Run every pending binding in the order they were recorded. Bindings
    /// whose node has since been deleted are dropped.
    pub fn run_pending(&mut self, tree: &mut Tree) -> Result<usize, LopError> {
        let pending = std::mem::take(&mut self.pending);
        let mut ran = 0;
        for binding in &pending {
            if !tree.contains(binding.node) {
                log::warn!("dropping assist `{}`: its node was deleted", binding.id);
                continue;
            }
            self.run(tree, binding)?;
            ran += 1;
        }
        Ok(ran)
    }
}

/// Removes every node referenced from a `no-access` property found in the
/// bound subtree
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAccessPrune;

impl NoAccessPrune {
    pub const ID: &'static str = "lopper,no-access";
    const PROPERTY: &'static str = "no-access";
}

impl Assist for NoAccessPrune {
    fn is_compat(&self, id: &str) -> bool {
        id == Self::ID
    }

    fn run(&self, context: &mut AssistContext<'_>) -> Result<()> {
        let tree = &mut *context.tree;
        let mut targets = vec![];
        for node in tree.walk_from(context.node) {
            let references = match tree.property(node, Self::PROPERTY) {
                Some(PropertyValue::Reference(target)) => vec![target.clone()],
                Some(PropertyValue::StringList(targets)) => targets
                    .iter()
                    .map(|t| t.trim_start_matches('&').to_string())
                    .collect(),
                Some(PropertyValue::String(target)) => {
                    vec![target.trim_start_matches('&').to_string()]
                }
                _ => continue,
            };
            for reference in references {
                match tree.resolve_reference(&reference) {
                    Some(target) if !targets.contains(&target) => targets.push(target),
                    Some(_) => {}
                    None => log::warn!("no-access reference `&{reference}` does not resolve"),
                }
            }
        }

        for target in targets {
            if tree.contains(target) {
                log::info!("removing inaccessible node {}", tree.path(target)?);
                tree.delete(target)?;
            }
        }
        Ok(())
    }
}
