//! Assembly of the package-install sub-stage in a scratch directory.
//!
//! pi-gen runs the scripts of a sub-stage in ascending order of their numeric
//! prefix. The generated layout is
//!
//! ```text
//! NN-run-chroot.sh   pre_install commands (optional)
//! NN-packages        host packages needed by run.sh
//! NN-run.sh          installs the target's packages from files/*.json
//! NN-run-chroot.sh   post_install commands (optional)
//! files/package-config.json
//! files/source-config.json (optional)
//! ```

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::FIRST_BOOT_FILE;
use crate::target::{to_pretty_json, TargetConfig};
use crate::template::{TemplateContext, TemplateRenderer};

pub const PACKAGES_SCRIPT: &str = "packages";
pub const RUN_SCRIPT: &str = "run.sh";
pub const CUSTOM_SCRIPT: &str = "run-chroot.sh";
pub const PACKAGE_CONFIG_FILE: &str = "package-config.json";
pub const SOURCE_CONFIG_FILE: &str = "source-config.json";

/// Builds one sub-stage directory, numbering scripts as they are added.
#[derive(Debug)]
pub struct SubStageBuilder {
    scripts_dir: PathBuf,
    dir: PathBuf,
    next_index: u32,
    scripts: Vec<PathBuf>,
}

impl SubStageBuilder {
    /// `scripts_dir` holds the fixed `packages` and `run.sh` scripts; `dir` is
    /// the scratch location, wiped by [`SubStageBuilder::build`].
    pub fn new(scripts_dir: impl Into<PathBuf>, dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            dir: dir.into(),
            next_index: 0,
            scripts: Vec::new(),
        }
    }

    /// Recreate the scratch directory for `config`. Returns the scripts in
    /// execution order.
    pub fn build(mut self, config: &TargetConfig) -> Result<Vec<PathBuf>> {
        info!(
            stage = %format!("stage{}", config.stage),
            sub_stage = %self.dir.display(),
            "Creating sub-stage"
        );

        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("removing old sub-stage '{}'", self.dir.display()))?;
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating sub-stage '{}'", self.dir.display()))?;

        self.write_config_files(config)?;

        if let Some(commands) = non_empty(&config.pre_install) {
            self.write_custom_script(commands)?;
        }

        self.copy_script(PACKAGES_SCRIPT)?;
        self.copy_script(RUN_SCRIPT)?;

        if let Some(commands) = non_empty(&config.post_install) {
            self.write_custom_script(commands)?;
        }

        Ok(self.scripts)
    }

    fn write_config_files(&self, config: &TargetConfig) -> Result<()> {
        let files_dir = self.dir.join("files");
        fs::create_dir_all(&files_dir)
            .with_context(|| format!("creating '{}'", files_dir.display()))?;

        if let Some(sources) = config.sources.as_deref().filter(|s| !s.is_empty()) {
            let path = files_dir.join(SOURCE_CONFIG_FILE);
            info!(file = %path.display(), "Creating source config file");
            write_json(&path, sources)?;
        }

        let path = files_dir.join(PACKAGE_CONFIG_FILE);
        info!(file = %path.display(), "Creating package config file");
        write_json(&path, &config.packages)
    }

    fn copy_script(&mut self, name: &str) -> Result<()> {
        let source = self.scripts_dir.join(name);
        let target = self.claim_slot(name);

        info!(source = %source.display(), target = %target.display(), "Copying sub-stage script");

        fs::copy(&source, &target).with_context(|| {
            format!(
                "copying sub-stage script '{}' to '{}'",
                source.display(),
                target.display()
            )
        })?;
        make_executable(&target)?;
        self.scripts.push(target);
        Ok(())
    }

    fn write_custom_script(&mut self, commands: &[String]) -> Result<()> {
        let target = self.claim_slot(CUSTOM_SCRIPT);

        info!(script = %target.display(), ?commands, "Creating custom script");

        fs::write(&target, custom_script(commands))
            .with_context(|| format!("writing custom script '{}'", target.display()))?;
        make_executable(&target)?;
        self.scripts.push(target);
        Ok(())
    }

    fn claim_slot(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join(format!("{:02}-{}", self.next_index, name));
        self.next_index += 1;
        path
    }
}

/// Strict-mode bash script running `commands` in order.
pub fn custom_script(commands: &[String]) -> String {
    format!("#!/bin/bash -ex\n\n{}\n", commands.join("\n"))
}

/// Replace the image's first-boot script with one running `commands`.
pub fn install_first_boot_script(
    renderer: &dyn TemplateRenderer,
    template: &Path,
    pipeline_dir: &Path,
    commands: &[String],
) -> Result<PathBuf> {
    let mut context = TemplateContext::new();
    context.insert("commands".to_string(), commands.join("\n"));
    let script = renderer.render(template, &context)?;

    let path = pipeline_dir.join(FIRST_BOOT_FILE);

    info!(script = %path.display(), ?commands, "Creating script to run on first boot");

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, script).with_context(|| format!("writing '{}'", path.display()))?;
    Ok(path)
}

fn non_empty(list: &Option<Vec<String>>) -> Option<&[String]> {
    list.as_deref().filter(|l| !l.is_empty())
}

fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = to_pretty_json(value).context("serializing sub-stage config")?;
    fs::write(path, json).with_context(|| format!("writing '{}'", path.display()))
}

fn make_executable(path: &Path) -> Result<()> {
    let mut perms = fs::metadata(path)
        .with_context(|| format!("reading metadata '{}'", path.display()))?
        .permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms)
        .with_context(|| format!("setting permissions '{}'", path.display()))
}
