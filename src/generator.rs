//! Top-level image generation: configure, build, collect.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use similar::{ChangeTag, TextDiff};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::builder::{image_date, ImageBuilder};
use crate::error::GeneratorError;
use crate::initializer::Initializer;
use crate::loader::ConfigLoader;
use crate::settings::{DEFAULT_BUILD_COMMAND, DEFAULT_OUTPUT_PATTERN};
use crate::target::{to_pretty_json, TargetConfig};

pub const DEPLOY_DIR: &str = "deploy";
pub const BEFORE_INSTALL_LIST: &str = "before-install.list";
pub const AFTER_INSTALL_LIST: &str = "after-install.list";

/// Where a generated image and its metadata files end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProperties {
    pub directory: PathBuf,
    pub name: String,
    pub extension: String,
}

impl ImageProperties {
    pub fn path(&self) -> PathBuf {
        self.with_extension(&self.extension)
    }

    pub fn with_extension(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", self.name, extension))
    }
}

pub struct ImageGenerator {
    config_path: PathBuf,
    loader: Box<dyn ConfigLoader>,
    initializer: Box<dyn Initializer>,
    builder: Box<dyn ImageBuilder>,
    output_dir: PathBuf,
    output_pattern: String,
    build_command: String,
}

impl ImageGenerator {
    pub fn new(
        config_path: impl Into<PathBuf>,
        loader: Box<dyn ConfigLoader>,
        initializer: Box<dyn Initializer>,
        builder: Box<dyn ImageBuilder>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            loader,
            initializer,
            builder,
            output_dir: output_dir.into(),
            output_pattern: DEFAULT_OUTPUT_PATTERN.to_string(),
            build_command: DEFAULT_BUILD_COMMAND.to_string(),
        }
    }

    /// Output file name pattern; `{target}` and `{version}` are substituted.
    pub fn with_output_pattern(mut self, pattern: &str) -> Self {
        self.output_pattern = pattern.to_string();
        self
    }

    pub fn with_build_command(mut self, command: &str) -> Self {
        self.build_command = command.to_string();
        self
    }

    pub fn generate(&self, target_name: &str) -> Result<TargetConfig> {
        let config = self.load_target(target_name)?;

        self.initializer.initialize(&config)?;

        let start_time = self.builder.build(&self.build_command)?;

        let source = self.source_image_path(&config, start_time)?;
        if !source.is_file() {
            error!(image = %source.display(), "Image not found");
            return Err(GeneratorError::ArtifactMissing { path: source }.into());
        }
        info!(image = %source.display(), "Image found");

        let properties = self.image_properties(&config);

        self.move_image(&source, &properties)?;
        self.export_config(&config, &properties)?;
        self.export_package_list(&properties)?;

        Ok(config)
    }

    fn load_target(&self, target_name: &str) -> Result<TargetConfig> {
        info!(target = target_name, "Loading target configuration");

        let targets = self.loader.load_list(&self.config_path)?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = targets.iter().find(|t| !seen.insert(t.name.as_str())) {
            return Err(GeneratorError::DuplicateTarget {
                target: duplicate.name.clone(),
            }
            .into());
        }

        let known: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();
        let Some(target) = targets.into_iter().find(|t| t.name == target_name) else {
            error!(target = target_name, target_list = ?known, "Target configuration not found");
            return Err(GeneratorError::TargetNotFound {
                target: target_name.to_string(),
                known,
            }
            .into());
        };

        info!(target = target_name, version = %target.version, "Target configuration loaded");

        Ok(target)
    }

    fn file_extension(&self) -> &'static str {
        self.initializer.configuration().compression.file_extension()
    }

    fn deploy_dir(&self) -> PathBuf {
        self.initializer.repository_path().join(DEPLOY_DIR)
    }

    fn source_image_path(&self, config: &TargetConfig, start_time: OffsetDateTime) -> Result<PathBuf> {
        let name = format!(
            "image_{}-{}-lite.{}",
            image_date(start_time)?,
            config.name,
            self.file_extension()
        );
        Ok(self.deploy_dir().join(name))
    }

    pub fn image_properties(&self, config: &TargetConfig) -> ImageProperties {
        ImageProperties {
            directory: self.output_dir.join(&config.name).join(&config.version),
            name: self
                .output_pattern
                .replace("{target}", &config.name)
                .replace("{version}", &config.version),
            extension: self.file_extension().to_string(),
        }
    }

    fn move_image(&self, source: &Path, properties: &ImageProperties) -> Result<()> {
        let target = properties.path();

        info!(source = %source.display(), target = %target.display(), "Moving image");

        fs::create_dir_all(&properties.directory).with_context(|| {
            format!("creating output directory '{}'", properties.directory.display())
        })?;

        if target.exists() {
            fs::remove_file(&target)
                .with_context(|| format!("removing previous image '{}'", target.display()))?;
        }

        if fs::rename(source, &target).is_err() {
            // Output may live on another filesystem than the checkout.
            fs::copy(source, &target).with_context(|| {
                format!("copying '{}' to '{}'", source.display(), target.display())
            })?;
            fs::remove_file(source)
                .with_context(|| format!("removing '{}'", source.display()))?;
        }

        Ok(())
    }

    fn export_config(&self, config: &TargetConfig, properties: &ImageProperties) -> Result<()> {
        let path = properties.with_extension("json");

        info!(file = %path.display(), "Exporting target configuration to file");

        let json = to_pretty_json(config).context("serializing target configuration")?;
        fs::write(&path, json).with_context(|| format!("writing '{}'", path.display()))
    }

    fn export_package_list(&self, properties: &ImageProperties) -> Result<()> {
        let deploy = self.deploy_dir();
        let before = read_list(&deploy.join(BEFORE_INSTALL_LIST))?;
        let after = read_list(&deploy.join(AFTER_INSTALL_LIST))?;

        let installed = installed_packages(&before, &after);
        let path = properties.with_extension("list");

        info!(file = %path.display(), count = installed.len(), "Exporting installed package list to file");

        let mut content = installed.join("\n");
        content.push('\n');
        fs::write(&path, content).with_context(|| format!("writing '{}'", path.display()))
    }
}

fn read_list(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading package list '{}'", path.display()))
}

fn strip_annotations(list: &str) -> String {
    static BRACKETS: OnceLock<Regex> = OnceLock::new();
    let re = BRACKETS.get_or_init(|| Regex::new(r"\[.*?\]").expect("bracket regex"));
    re.replace_all(list, "")
        .lines()
        .map(|line| format!("{line}\n"))
        .collect()
}

/// Lines present in `after` but not in `before`, once bracketed annotations
/// are removed, in the order they appear in `after`.
pub fn installed_packages(before: &str, after: &str) -> Vec<String> {
    let before = strip_annotations(before);
    let after = strip_annotations(after);

    TextDiff::from_lines(&before, &after)
        .iter_all_changes()
        .filter(|change| change.tag() == ChangeTag::Insert)
        .map(|change| change.value().trim().to_string())
        .filter(|package| !package.is_empty())
        .collect()
}
