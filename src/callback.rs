use std::collections::HashMap;

use anyhow::Result;

use crate::error::LopError;
use crate::selection::Selection;
use crate::tree::Tree;

/// What a callback gets to see: the live tree and the selection exactly as
/// the previous operation left them
pub struct CallbackContext<'a> {
    pub tree: &'a mut Tree,
    pub selection: &'a mut Selection,
    /// The snippet body from the fragment, opaque to the engine
    pub code: &'a str,
}

/// A transformation supplied by the driver for `code` operations
pub trait Callback {
    fn invoke(&self, context: &mut CallbackContext<'_>) -> Result<()>;
}

impl<F> Callback for F
where
    F: Fn(&mut CallbackContext<'_>) -> Result<()>,
{
    fn invoke(&self, context: &mut CallbackContext<'_>) -> Result<()> {
        self(context)
    }
}

/// Registered callbacks, looked up by reference string
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Box<dyn Callback>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names = self.callbacks.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &names)
            .finish()
    }
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The callbacks the command line tool ships with
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("print-selection", print_selection);
        registry.register("delete-selection", delete_selection);
        registry
    }

    pub fn register(&mut self, reference: impl Into<String>, callback: impl Callback + 'static) {
        self.callbacks.insert(reference.into(), Box::new(callback));
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.callbacks.contains_key(reference)
    }

    /// Run a callback against the tree and selection.
    ///
    /// Mutations land directly in `tree`. The returned selection has any
    /// matches on deleted nodes removed.
    pub fn invoke(
        &self,
        reference: &str,
        code: &str,
        tree: &mut Tree,
        mut selection: Selection,
    ) -> Result<Selection, LopError> {
        let callback = self
            .callbacks
            .get(reference)
            .ok_or_else(|| LopError::Callback {
                callback: reference.to_string(),
                source: "no callback registered under this reference".into(),
            })?;

        log::trace!("invoking callback `{reference}` on {} node(s)", selection.len());
        let mut context = CallbackContext {
            tree: &mut *tree,
            selection: &mut selection,
            code,
        };
        callback
            .invoke(&mut context)
            .map_err(|source| LopError::Callback {
                callback: reference.to_string(),
                source: source.into(),
            })?;

        selection.prune(tree);
        Ok(selection)
    }
}

fn print_selection(context: &mut CallbackContext<'_>) -> Result<()> {
    for path in context.selection.paths(context.tree) {
        println!("{path}");
    }
    Ok(())
}

fn delete_selection(context: &mut CallbackContext<'_>) -> Result<()> {
    for node in context.selection.nodes() {
        // an earlier deletion may already have taken this node with its parent
        if context.tree.contains(node) {
            let path = context.tree.path(node)?;
            context.tree.delete(node)?;
            log::info!("deleted {path}");
        }
    }
    context.selection.prune(context.tree);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Match;

    #[test]
    fn unknown_reference_is_a_callback_error() {
        let registry = CallbackRegistry::new();
        let mut tree = Tree::new();
        let err = registry
            .invoke("missing", "", &mut tree, Selection::new())
            .unwrap_err();
        assert!(matches!(err, LopError::Callback { .. }));
    }

    #[test]
    fn closures_mutate_tree_and_selection() {
        let mut registry = CallbackRegistry::new();
        registry.register("add-child", |context: &mut CallbackContext<'_>| -> Result<()> {
            let root = context.tree.root();
            let child = context.tree.add_node(root, "child")?;
            context.selection.push(Match::node_only(child));
            Ok(())
        });

        let mut tree = Tree::new();
        let selection = registry
            .invoke("add-child", "", &mut tree, Selection::new())
            .unwrap();
        assert_eq!(selection.paths(&tree), ["/child"]);
    }

    #[test]
    fn failures_carry_the_reference() {
        let mut registry = CallbackRegistry::new();
        registry.register("boom", |_: &mut CallbackContext<'_>| -> Result<()> {
            anyhow::bail!("exploded")
        });
        let err = registry
            .invoke("boom", "", &mut Tree::new(), Selection::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "callback `boom` failed: exploded");
    }

    #[test]
    fn builtin_delete_selection() {
        let registry = CallbackRegistry::with_builtins();
        let mut tree = Tree::new();
        let root = tree.root();
        let a = tree.add_node(root, "a").unwrap();
        let b = tree.add_node(a, "b").unwrap();
        let selection = Selection::from_matches([Match::node_only(a), Match::node_only(b)]);
        let selection = registry
            .invoke("delete-selection", "", &mut tree, selection)
            .unwrap();
        assert!(selection.is_empty());
        assert_eq!(tree.len(), 1);
    }
}
