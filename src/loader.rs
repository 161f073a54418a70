//! Target configuration loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::target::TargetConfig;

pub trait ConfigLoader {
    fn load_list(&self, source: &Path) -> Result<Vec<TargetConfig>>;
}

/// Reads a JSON array of target configurations from disk.
#[derive(Debug, Default, Clone)]
pub struct JsonConfigLoader;

impl ConfigLoader for JsonConfigLoader {
    fn load_list(&self, source: &Path) -> Result<Vec<TargetConfig>> {
        let bytes = fs::read(source)
            .with_context(|| format!("reading target configuration '{}'", source.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing target configuration '{}'", source.display()))
    }
}

/// Resolve a target configuration source to a local file. URLs are downloaded
/// into `download_dir` (always refreshed); anything else is taken as a path.
pub fn download_config(source: &str, download_dir: &Path) -> Result<PathBuf> {
    if !is_url(source) {
        return Ok(PathBuf::from(source));
    }

    let file_name = source
        .split(|c| c == '?' || c == '#')
        .next()
        .and_then(|s| s.rsplit('/').next())
        .filter(|s| !s.is_empty())
        .unwrap_or("target-config.json");
    fs::create_dir_all(download_dir)
        .with_context(|| format!("creating download directory '{}'", download_dir.display()))?;
    let target = download_dir.join(file_name);

    info!(url = source, file = %target.display(), "Downloading target configuration");

    let output = Command::new("curl")
        .args(["-fsSL", "-o"])
        .arg(&target)
        .arg(source)
        .output()
        .with_context(|| format!("running curl for '{source}'"))?;

    if !output.status.success() {
        bail!(
            "downloading '{}' failed: {}",
            source,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(target)
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
