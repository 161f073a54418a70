//! Minimal `{{ key }}` template rendering from the resource tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

pub type TemplateContext = BTreeMap<String, String>;

pub trait TemplateRenderer {
    /// Render `template` (relative to the renderer's root) with `context`.
    fn render(&self, template: &Path, context: &TemplateContext) -> Result<String>;
}

/// Renders templates stored under a resource root directory.
#[derive(Debug, Clone)]
pub struct FileTemplateRenderer {
    root: PathBuf,
}

impl FileTemplateRenderer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TemplateRenderer for FileTemplateRenderer {
    fn render(&self, template: &Path, context: &TemplateContext) -> Result<String> {
        let path = self.root.join(template);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading template '{}'", path.display()))?;
        Ok(render_str(&text, context))
    }
}

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex")
    })
}

/// Substitute placeholders; unknown keys render empty. The result always ends
/// with exactly one newline.
pub fn render_str(text: &str, context: &TemplateContext) -> String {
    let rendered = placeholder().replace_all(text, |caps: &Captures| {
        context.get(&caps[1]).cloned().unwrap_or_default()
    });
    format!("{}\n", rendered.trim_end_matches('\n'))
}
