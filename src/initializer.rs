//! Preparation of the pipeline checkout for one target.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::configure::Configurator;
use crate::error::GeneratorError;
use crate::installer::PackageInstaller;
use crate::repository::Repository;
use crate::settings::BuildConfiguration;
use crate::target::TargetConfig;

/// Host dependencies pi-gen lists at the root of its repository.
pub const DEPENDENCY_FILE: &str = "depends";

/// Needed for cross-architecture chroots but missing from `depends`.
pub const EXTRA_DEPENDENCY: &str = "binfmt-support";

pub trait Initializer {
    fn initialize(&self, config: &TargetConfig) -> Result<()>;
    fn repository_path(&self) -> &Path;
    fn configuration(&self) -> &BuildConfiguration;
}

pub struct BuildInitializer {
    repository: Box<dyn Repository>,
    installer: Box<dyn PackageInstaller>,
    configurator: Box<dyn Configurator>,
}

impl BuildInitializer {
    pub fn new(
        repository: Box<dyn Repository>,
        installer: Box<dyn PackageInstaller>,
        configurator: Box<dyn Configurator>,
    ) -> Self {
        Self {
            repository,
            installer,
            configurator,
        }
    }

    fn checkout_target_ref(&self, config: &TargetConfig) -> Result<()> {
        if !self.repository.ref_exists(&config.reference)? {
            error!(reference = %config.reference, "Reference not exists in repository");
            return Err(GeneratorError::InvalidReference {
                reference: config.reference.clone(),
            }
            .into());
        }

        info!(reference = %config.reference, "Checking out reference");
        self.repository
            .checkout(&config.reference)
            .with_context(|| format!("checking out '{}'", config.reference))
    }

    fn install_build_dependencies(&self) -> Result<()> {
        let path = self.repository.working_tree_dir().join(DEPENDENCY_FILE);
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading dependency list '{}'", path.display()))?;

        for dependency in parse_dependencies(&content) {
            info!(dependency = %dependency, "Installing build dependency");

            if !self.installer.install(&dependency) {
                error!(dependency = %dependency, "Failed to install dependency");
                return Err(GeneratorError::DependencyInstall {
                    package: dependency,
                }
                .into());
            }

            info!(dependency = %dependency, "Dependency installed");
        }

        Ok(())
    }
}

impl Initializer for BuildInitializer {
    fn initialize(&self, config: &TargetConfig) -> Result<()> {
        self.checkout_target_ref(config)?;
        self.install_build_dependencies()?;
        self.configurator.configure(config)
    }

    fn repository_path(&self) -> &Path {
        self.repository.working_tree_dir()
    }

    fn configuration(&self) -> &BuildConfiguration {
        self.configurator.configuration()
    }
}

/// Package names from a `depends` file. `cmd:package` lines keep the part
/// after the first colon; [`EXTRA_DEPENDENCY`] is always appended.
pub fn parse_dependencies(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| match line.split_once(':') {
            Some((_, package)) => package.trim(),
            None => line.trim(),
        })
        .filter(|package| !package.is_empty())
        .map(str::to_string)
        .chain(std::iter::once(EXTRA_DEPENDENCY.to_string()))
        .collect()
}
