//! Injection of a target's configuration into a pi-gen checkout.
//!
//! [`BuildConfigurator::configure`] runs four steps in order:
//!
//! 1. boot file edits ([`boot_files`])
//! 2. sub-stage assembly in a scratch directory ([`sub_stage`])
//! 3. placement of the sub-stage into the target stage ([`append`])
//! 4. rendering of the top-level `config` file ([`build_config`])
//!
//! Nothing is rolled back when a later step fails; the checkout has to be
//! reset before the next attempt.

pub mod append;
pub mod boot_files;
pub mod build_config;
pub mod sub_stage;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::settings::BuildConfiguration;
use crate::target::TargetConfig;
use crate::template::TemplateRenderer;

pub const BOOT_CMDLINE_FILE: &str = "stage1/00-boot-files/files/cmdline.txt";
pub const BOOT_CONFIG_FILE: &str = "stage1/00-boot-files/files/config.txt";
pub const RESIZE_INIT_PATCH: &str = "stage2/01-sys-tweaks/00-patches/07-resize-init.diff";
pub const FIRST_BOOT_FILE: &str = "stage2/01-sys-tweaks/files/rc.local";
pub const PIPELINE_CONFIG_FILE: &str = "config";

pub const DEFAULT_SUB_STAGE_NAME: &str = "install-packages";

pub trait Configurator {
    fn configuration(&self) -> &BuildConfiguration;
    fn configure(&self, config: &TargetConfig) -> Result<()>;
}

pub struct BuildConfigurator {
    resource_root: PathBuf,
    pipeline_dir: PathBuf,
    configuration: BuildConfiguration,
    renderer: Box<dyn TemplateRenderer>,
    sub_stage_name: String,
}

impl BuildConfigurator {
    pub fn new(
        resource_root: impl Into<PathBuf>,
        pipeline_dir: impl Into<PathBuf>,
        configuration: BuildConfiguration,
        renderer: Box<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            resource_root: resource_root.into(),
            pipeline_dir: pipeline_dir.into(),
            configuration,
            renderer,
            sub_stage_name: DEFAULT_SUB_STAGE_NAME.to_string(),
        }
    }

    pub fn with_sub_stage_name(mut self, name: &str) -> Self {
        self.sub_stage_name = name.to_string();
        self
    }

    /// Where the sub-stage is assembled before being copied into the pipeline.
    pub fn scratch_dir(&self) -> PathBuf {
        self.resource_root.join("build").join(&self.sub_stage_name)
    }

    pub fn pipeline_dir(&self) -> &Path {
        &self.pipeline_dir
    }
}

impl Configurator for BuildConfigurator {
    fn configuration(&self) -> &BuildConfiguration {
        &self.configuration
    }

    fn configure(&self, config: &TargetConfig) -> Result<()> {
        info!(target = %config.name, "Configuring build");

        boot_files::update_boot_files(&self.pipeline_dir, config)
            .context("updating boot files")?;

        let scratch = self.scratch_dir();
        sub_stage::SubStageBuilder::new(self.resource_root.join("scripts"), &scratch)
            .build(config)
            .context("building sub-stage")?;

        if let Some(commands) = config.first_boot.as_deref().filter(|c| !c.is_empty()) {
            sub_stage::install_first_boot_script(
                self.renderer.as_ref(),
                &self.configuration.first_boot_template,
                &self.pipeline_dir,
                commands,
            )
            .context("installing first boot script")?;
        }

        append::append_sub_stage(&self.pipeline_dir, config.stage, &self.sub_stage_name, &scratch)
            .context("appending sub-stage")?;

        build_config::write_build_config(
            self.renderer.as_ref(),
            &self.configuration,
            &self.pipeline_dir,
            config,
        )
        .context("writing build config")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Compression, DEFAULT_CONFIG_TEMPLATE};
    use crate::target::PackageConfig;
    use crate::template::FileTemplateRenderer;
    use crate::test_support::{copy_resources, PipelineTree};
    use std::fs;
    use tempfile::TempDir;

    fn configurator(resources: &Path, tree: &PipelineTree) -> BuildConfigurator {
        BuildConfigurator::new(
            resources,
            tree.path(),
            BuildConfiguration::new(Compression::Xz, true, true, DEFAULT_CONFIG_TEMPLATE),
            Box::new(FileTemplateRenderer::new(resources)),
        )
    }

    #[test]
    fn test_configure_generates_sub_stage_and_config() {
        let resources = TempDir::new().unwrap();
        copy_resources(resources.path());
        let tree = PipelineTree::new();
        let mut config = TargetConfig::new("test-target", "1.0.0", "test-ref");
        config.packages.push(PackageConfig::named("package1"));

        configurator(resources.path(), &tree).configure(&config).unwrap();

        let stage = tree.path().join("stage2/02-install-packages");
        assert!(stage.join("00-packages").is_file());
        assert!(stage.join("01-run.sh").is_file());
        assert!(stage.join("files/package-config.json").is_file());
        assert!(tree.read(PIPELINE_CONFIG_FILE).contains("IMG_NAME=\"test-target\""));
        assert_eq!(tree.read(BOOT_CMDLINE_FILE), PipelineTree::CMDLINE);
        assert_eq!(tree.read(FIRST_BOOT_FILE), PipelineTree::RC_LOCAL);
    }

    #[test]
    fn test_configure_with_every_option() {
        let resources = TempDir::new().unwrap();
        copy_resources(resources.path());
        let tree = PipelineTree::new();
        let mut config = TargetConfig::new("test-target", "1.0.0", "test-ref");
        config.boot_cmdline = Some(vec!["option1".to_string(), "option2".to_string()]);
        config.boot_config = Some(vec!["option3".to_string(), "option4".to_string()]);
        config.pre_install = Some(vec!["cmd1".to_string()]);
        config.post_install = Some(vec!["cmd2".to_string()]);
        config.first_boot = Some(vec!["cmd3".to_string()]);

        configurator(resources.path(), &tree).configure(&config).unwrap();

        let cmdline = format!("{} option1 option2\n", PipelineTree::CMDLINE.trim_end());
        assert_eq!(tree.read(BOOT_CMDLINE_FILE), cmdline);
        assert!(tree.read(RESIZE_INIT_PATCH).contains(cmdline.trim_end()));
        assert!(tree.read(BOOT_CONFIG_FILE).ends_with("option3\noption4\n"));
        assert!(tree.read(FIRST_BOOT_FILE).contains("cmd3"));

        let stage = tree.path().join("stage2/02-install-packages");
        for name in ["00-run-chroot.sh", "01-packages", "02-run.sh", "03-run-chroot.sh"] {
            assert!(stage.join(name).is_file(), "missing {name}");
        }
    }

    #[test]
    fn test_configure_into_other_stage() {
        let resources = TempDir::new().unwrap();
        copy_resources(resources.path());
        let tree = PipelineTree::new();
        fs::create_dir_all(tree.path().join("stage3/00-install-packages")).unwrap();
        let mut config = TargetConfig::new("test-target", "1.0.0", "test-ref");
        config.stage = 3;

        configurator(resources.path(), &tree).configure(&config).unwrap();

        assert!(tree.path().join("stage3/01-install-packages/01-run.sh").is_file());
        assert!(tree
            .read(PIPELINE_CONFIG_FILE)
            .contains("STAGE_LIST=\"stage0 stage1 stage2 stage3\""));
    }

    #[test]
    fn test_scratch_dir_under_resource_root() {
        let tree = PipelineTree::new();
        let configurator =
            configurator(Path::new("/opt/generator"), &tree).with_sub_stage_name("custom");
        assert_eq!(
            configurator.scratch_dir(),
            PathBuf::from("/opt/generator/build/custom")
        );
    }
}
