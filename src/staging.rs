use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use diffy::{DiffOptions, PatchFormatter};
use strum::{Display, EnumString};

use crate::tree::Tree;

/// How a tree is written out, chosen from the output file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Dts,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default();
        extension.parse().map_err(|_| {
            anyhow::anyhow!(
                "cannot tell the output format of {} (expected .json or .dts)",
                path.display()
            )
        })
    }

    pub fn render(self, tree: &Tree) -> Result<String> {
        Ok(match self {
            Self::Json => tree.to_json()?,
            Self::Dts => tree.to_dts(),
        })
    }
}

/// A rendered result that can be previewed as a diff before being written
#[derive(Debug, Clone, fieldwork::Fieldwork)]
#[fieldwork(get)]
pub struct StagedOutput {
    path: PathBuf,
    #[fieldwork(get(copy))]
    format: OutputFormat,
    original: String,
    rendered: String,
}

impl StagedOutput {
    pub fn new(path: impl Into<PathBuf>, original: &Tree, transformed: &Tree) -> Result<Self> {
        let path = path.into();
        let format = OutputFormat::from_path(&path)?;
        Ok(Self {
            original: format.render(original)?,
            rendered: format.render(transformed)?,
            path,
            format,
        })
    }

    pub fn is_unchanged(&self) -> bool {
        self.original == self.rendered
    }

    /// The changes the transformation made, without diff headers
    pub fn diff(&self) -> String {
        let patch = DiffOptions::new().create_patch(&self.original, &self.rendered);
        let formatter = PatchFormatter::new().missing_newline_message(false);
        let diff_output = formatter.fmt_patch(&patch).to_string();

        let mut diff = String::from("===DIFF===\n");
        for line in diff_output.lines() {
            if line.starts_with("---") || line.starts_with("+++") || line.starts_with("@@") {
                continue;
            }
            diff.push_str(line);
            diff.push('\n');
        }

        if diff.ends_with('\n') {
            diff.pop();
        }
        diff
    }

    /// Write the rendered output. An existing file is only replaced with `force`.
    pub fn commit(self, force: bool) -> Result<PathBuf> {
        if self.path.exists() && !force {
            bail!(
                "{} already exists, pass --force to overwrite it",
                self.path.display()
            );
        }
        std::fs::write(&self.path, &self.rendered)
            .with_context(|| format!("writing {}", self.path.display()))?;
        log::info!("wrote {} output to {}", self.format, self.path.display());
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            OutputFormat::from_path(Path::new("out/system.dts")).unwrap(),
            OutputFormat::Dts
        );
        assert_eq!(
            OutputFormat::from_path(Path::new("tree.json")).unwrap(),
            OutputFormat::Json
        );
        assert!(OutputFormat::from_path(Path::new("tree.yaml")).is_err());
        assert!(OutputFormat::from_path(Path::new("tree")).is_err());
    }

    #[test]
    fn diff_shows_only_changed_lines() {
        let original = Tree::from_json(r#"{ "children": [ { "name": "amba" } ] }"#).unwrap();
        let mut transformed = original.clone();
        let amba = transformed.resolve("/amba").unwrap();
        transformed.delete(amba).unwrap();

        let staged = StagedOutput::new("system.dts", &original, &transformed).unwrap();
        assert!(!staged.is_unchanged());
        let diff = staged.diff();
        assert!(diff.starts_with("===DIFF===\n"));
        assert!(diff.contains("-    amba {"));
        assert!(!diff.contains("@@"));
    }
}
