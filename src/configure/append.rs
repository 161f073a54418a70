//! Placement of an assembled sub-stage into a pipeline stage.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

/// Next free sub-stage index of `stage_dir`: one past the highest numeric
/// prefix among its subdirectories, or 0 when none has one.
pub fn next_slot_index(stage_dir: &Path) -> Result<u32> {
    let mut highest: Option<u32> = None;

    for entry in fs::read_dir(stage_dir)
        .with_context(|| format!("reading stage directory '{}'", stage_dir.display()))?
    {
        let entry = entry
            .with_context(|| format!("reading directory entry in '{}'", stage_dir.display()))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(index) = leading_index(&name.to_string_lossy()) {
            highest = Some(highest.map_or(index, |h| h.max(index)));
        }
    }

    Ok(highest.map_or(0, |h| h + 1))
}

fn leading_index(name: &str) -> Option<u32> {
    let end = name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(name.len());
    name[..end].parse().ok()
}

/// Copy `sub_stage` into `<pipeline_dir>/stage<stage>/<NN>-<name>`, where NN is
/// the next free slot. Returns the created directory.
pub fn append_sub_stage(
    pipeline_dir: &Path,
    stage: u32,
    name: &str,
    sub_stage: &Path,
) -> Result<PathBuf> {
    let stage_dir = pipeline_dir.join(format!("stage{stage}"));
    let index = next_slot_index(&stage_dir)?;
    let target = stage_dir.join(format!("{index:02}-{name}"));

    info!(
        stage = %format!("stage{stage}"),
        sub_stage = %target.display(),
        "Appending sub-stage to stage"
    );

    fs::create_dir_all(&target)
        .with_context(|| format!("creating sub-stage directory '{}'", target.display()))?;
    copy_tree(sub_stage, &target)?;

    Ok(target)
}

/// Merge the contents of `src` into `dst`, overwriting files that exist in both.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.with_context(|| format!("walking '{}'", src.display()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
        let dest = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)
                .with_context(|| format!("creating '{}'", dest.display()))?;
        } else {
            fs::copy(entry.path(), &dest).with_context(|| {
                format!(
                    "copying '{}' to '{}'",
                    entry.path().display(),
                    dest.display()
                )
            })?;
        }
    }
    Ok(())
}
