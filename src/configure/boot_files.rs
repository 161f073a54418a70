//! In-place edits of the pipeline's boot files.
//!
//! Edits append to whatever is already there, so running them twice on the
//! same checkout doubles the options. The checkout is reset before each run.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{BOOT_CMDLINE_FILE, BOOT_CONFIG_FILE, RESIZE_INIT_PATCH};
use crate::target::TargetConfig;

/// Apply the target's `boot_cmdline` and `boot_config` options. Absent or
/// empty lists leave the files untouched.
pub fn update_boot_files(pipeline_dir: &Path, config: &TargetConfig) -> Result<()> {
    if let Some(options) = config.boot_cmdline.as_deref().filter(|o| !o.is_empty()) {
        append_cmdline_options(pipeline_dir, options)?;
    }

    if let Some(options) = config.boot_config.as_deref().filter(|o| !o.is_empty()) {
        append_config_options(pipeline_dir, options)?;
    }

    Ok(())
}

/// Extend the single kernel command line and keep the resize-init patch, which
/// embeds that same line, in sync with it.
pub fn append_cmdline_options(pipeline_dir: &Path, options: &[String]) -> Result<()> {
    let cmdline_path = pipeline_dir.join(BOOT_CMDLINE_FILE);

    info!(file = %cmdline_path.display(), ?options, "Appending boot command line options");

    let content = fs::read_to_string(&cmdline_path)
        .with_context(|| format!("reading '{}'", cmdline_path.display()))?;
    let cmdline = content.trim_end_matches('\n');
    let new_cmdline = format!("{} {}", cmdline, options.join(" "));

    fs::write(&cmdline_path, format!("{new_cmdline}\n"))
        .with_context(|| format!("writing '{}'", cmdline_path.display()))?;

    let patch_path = pipeline_dir.join(RESIZE_INIT_PATCH);
    let patch = fs::read_to_string(&patch_path)
        .with_context(|| format!("reading '{}'", patch_path.display()))?;

    if cmdline.is_empty() || !patch.contains(cmdline) {
        warn!(
            file = %patch_path.display(),
            cmdline,
            "Original command line not found in patch, patch left unchanged"
        );
        return Ok(());
    }

    fs::write(&patch_path, patch.replace(cmdline, &new_cmdline))
        .with_context(|| format!("writing '{}'", patch_path.display()))?;

    Ok(())
}

/// Append each option as its own line of the boot config.
pub fn append_config_options(pipeline_dir: &Path, options: &[String]) -> Result<()> {
    let config_path = pipeline_dir.join(BOOT_CONFIG_FILE);

    info!(file = %config_path.display(), ?options, "Appending boot config options");

    let mut file = OpenOptions::new()
        .append(true)
        .open(&config_path)
        .with_context(|| format!("opening '{}' for append", config_path.display()))?;
    writeln!(file, "{}", options.join("\n"))
        .with_context(|| format!("appending to '{}'", config_path.display()))?;

    Ok(())
}
