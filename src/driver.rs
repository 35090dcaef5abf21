use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::assist::{AssistBinding, AssistRegistry};
use crate::callback::CallbackRegistry;
use crate::error::LopError;
use crate::executor::{ExecOptions, Executor, RunReport};
use crate::fragment::Fragment;
use crate::tree::{PropertyValue, Tree};

/// Owns one base tree and runs every loaded fragment against it
#[derive(Debug, fieldwork::Fieldwork)]
#[fieldwork(get, get_mut, set, with)]
pub struct Driver {
    tree: Tree,
    fragments: Vec<Fragment>,
    assists: AssistRegistry,
    callbacks: CallbackRegistry,
    #[fieldwork(get(copy))]
    options: ExecOptions,
}

impl Driver {
    /// A driver with the built-in assists and callbacks registered
    pub fn new(tree: Tree) -> Self {
        Self {
            tree,
            fragments: vec![],
            assists: AssistRegistry::with_builtins(),
            callbacks: CallbackRegistry::with_builtins(),
            options: ExecOptions::default(),
        }
    }

    pub fn add_fragment(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    /// Load every fragment under the given paths. Directories are walked for
    /// `*.json` files. Nothing is added unless every file loads.
    pub fn load_paths<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize> {
        let mut loaded = vec![];
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                for entry in WalkDir::new(path).sort_by_file_name() {
                    let entry = entry.with_context(|| format!("reading {}", path.display()))?;
                    let is_json = entry.path().extension().is_some_and(|e| e == "json");
                    if entry.file_type().is_file() && is_json {
                        loaded.push(load(entry.path())?);
                    }
                }
            } else {
                loaded.push(load(path)?);
            }
        }

        let count = loaded.len();
        self.fragments.extend(loaded);
        Ok(count)
    }

    /// Run all fragments in priority order, then any pending assists when
    /// `auto_assist` is set. Stops at the first failing fragment; its earlier
    /// operations and every earlier fragment stay applied.
    pub fn run(&mut self) -> Result<Vec<RunReport>> {
        self.fragments.sort_by_key(Fragment::priority);

        let mut reports = vec![];
        for fragment in &self.fragments {
            log::info!(
                "running fragment `{}` (priority {})",
                fragment.name(),
                fragment.priority()
            );
            let report = Executor::new(&mut self.assists, &self.callbacks, self.options)
                .run(&mut self.tree, fragment)
                .with_context(|| format!("fragment `{}`", fragment.name()))?;
            reports.push(report);
        }

        if self.options.auto_assist {
            let ran = self
                .assists
                .run_pending(&mut self.tree)
                .context("running pending assists")?;
            log::info!("ran {ran} pending assist(s)");
        } else if !self.assists.pending().is_empty() {
            log::info!(
                "{} assist(s) left pending",
                self.assists.pending().len()
            );
        }

        Ok(reports)
    }

    /// Set up a target domain node: the first `compatible` entry
    /// with a registered assist runs against that node straight away
    pub fn apply_target(&mut self, target: &str) -> Result<()> {
        let node = self
            .tree
            .resolve(target)
            .with_context(|| format!("target domain `{target}`"))?;
        let compatible = match self.tree.property(node, "compatible") {
            Some(PropertyValue::String(id)) => vec![id.clone()],
            Some(PropertyValue::StringList(ids)) => ids.clone(),
            _ => anyhow::bail!("target domain `{target}` has no compatible string"),
        };
        let id = compatible
            .iter()
            .find(|id| self.assists.lookup(id).is_some())
            .ok_or_else(|| LopError::UnknownAssist(compatible.join(", ")))
            .with_context(|| format!("target domain `{target}`"))?;

        log::info!("applying domain `{id}` to {target}");
        self.assists
            .run(&mut self.tree, &AssistBinding::new(id.as_str(), node, vec![]))
            .with_context(|| format!("target domain `{target}`"))
    }

    pub fn into_tree(self) -> Tree {
        self.tree
    }
}

fn load(path: &Path) -> Result<Fragment> {
    Fragment::from_path(path).with_context(|| format!("loading {}", path.display()))
}
