//! Build-wide settings and the optional TOML settings file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;

pub const DEFAULT_CONFIG_TEMPLATE: &str = "template/config.template";
pub const DEFAULT_FIRST_BOOT_TEMPLATE: &str = "template/first_boot.template";
pub const DEFAULT_OUTPUT_PATTERN: &str = "{target}-{version}";
pub const DEFAULT_BUILD_COMMAND: &str = "./build.sh";

/// Output image compression, as understood by the pipeline's `DEPLOY_COMPRESSION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    Zip,
    Gz,
    #[default]
    Xz,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Zip => "zip",
            Compression::Gz => "gz",
            Compression::Xz => "xz",
        }
    }

    /// Extension of the image file the pipeline deploys.
    pub fn file_extension(self) -> &'static str {
        match self {
            Compression::None => "img",
            Compression::Zip => "zip",
            Compression::Gz => "img.gz",
            Compression::Xz => "img.xz",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfiguration {
    pub compression: Compression,
    pub enable_ssh: bool,
    pub clean_build: bool,
    /// Pipeline `config` template, relative to the resource root.
    pub config_template: PathBuf,
    /// Template rendered into the image's first-boot script.
    pub first_boot_template: PathBuf,
}

impl BuildConfiguration {
    pub fn new(
        compression: Compression,
        enable_ssh: bool,
        clean_build: bool,
        config_template: impl Into<PathBuf>,
    ) -> Self {
        Self {
            compression,
            enable_ssh,
            clean_build,
            config_template: config_template.into(),
            first_boot_template: PathBuf::from(DEFAULT_FIRST_BOOT_TEMPLATE),
        }
    }

    pub fn with_first_boot_template(mut self, template: impl Into<PathBuf>) -> Self {
        self.first_boot_template = template.into();
        self
    }
}

/// Values read from a `--settings` TOML file. Every key is optional; command
/// line flags take precedence over these.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub download: Option<PathBuf>,
    pub repository_path: Option<PathBuf>,
    pub repository_url: Option<String>,
    pub output: Option<PathBuf>,
    pub output_pattern: Option<String>,
    pub resource_root: Option<PathBuf>,
    pub config_template: Option<PathBuf>,
    pub compression: Option<Compression>,
    pub enable_ssh: Option<bool>,
    pub clean_build: Option<bool>,
    pub build_command: Option<String>,
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading settings file '{}'", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing settings file '{}'", path.display()))
}
