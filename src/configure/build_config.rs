//! The pipeline's top-level `config` file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::PIPELINE_CONFIG_FILE;
use crate::settings::BuildConfiguration;
use crate::target::TargetConfig;
use crate::template::{TemplateContext, TemplateRenderer};

pub fn build_config_context(
    config: &TargetConfig,
    configuration: &BuildConfiguration,
) -> TemplateContext {
    let stage_list = (0..=config.stage)
        .map(|i| format!("stage{i}"))
        .collect::<Vec<_>>()
        .join(" ");

    [
        ("target_name", config.name.clone()),
        ("target_hostname", config.name.clone()),
        ("compression", configuration.compression.to_string()),
        ("enable_ssh", flag(configuration.enable_ssh)),
        ("clean_build", flag(configuration.clean_build)),
        ("stage_list", stage_list),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn flag(value: bool) -> String {
    let flag = if value { "1" } else { "0" };
    flag.to_string()
}

/// Render the build configuration over any existing `config` file.
pub fn write_build_config(
    renderer: &dyn TemplateRenderer,
    configuration: &BuildConfiguration,
    pipeline_dir: &Path,
    config: &TargetConfig,
) -> Result<PathBuf> {
    let context = build_config_context(config, configuration);
    let rendered = renderer.render(&configuration.config_template, &context)?;
    let path = pipeline_dir.join(PIPELINE_CONFIG_FILE);

    info!(file = %path.display(), "Creating build config file");

    fs::write(&path, rendered).with_context(|| format!("writing '{}'", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Compression, DEFAULT_CONFIG_TEMPLATE};
    use crate::template::FileTemplateRenderer;
    use crate::test_support::resource_root;
    use tempfile::TempDir;

    #[test]
    fn test_context_values() {
        let mut config = TargetConfig::new("edge-node", "1.0.0", "master");
        config.stage = 3;
        let configuration =
            BuildConfiguration::new(Compression::Gz, true, false, DEFAULT_CONFIG_TEMPLATE);

        let context = build_config_context(&config, &configuration);

        assert_eq!(context["target_name"], "edge-node");
        assert_eq!(context["target_hostname"], "edge-node");
        assert_eq!(context["compression"], "gz");
        assert_eq!(context["enable_ssh"], "1");
        assert_eq!(context["clean_build"], "0");
        assert_eq!(context["stage_list"], "stage0 stage1 stage2 stage3");
    }

    #[test]
    fn test_stage_zero_lists_single_stage() {
        let mut config = TargetConfig::new("tiny", "1.0.0", "master");
        config.stage = 0;
        let configuration =
            BuildConfiguration::new(Compression::Xz, false, false, DEFAULT_CONFIG_TEMPLATE);

        assert_eq!(build_config_context(&config, &configuration)["stage_list"], "stage0");
    }

    #[test]
    fn test_write_build_config_overwrites() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(PIPELINE_CONFIG_FILE), "IMG_NAME=old\n").unwrap();
        let renderer = FileTemplateRenderer::new(resource_root());
        let configuration =
            BuildConfiguration::new(Compression::Xz, true, true, DEFAULT_CONFIG_TEMPLATE);

        let path = write_build_config(
            &renderer,
            &configuration,
            temp.path(),
            &TargetConfig::new("demo", "1.0.0", "master"),
        )
        .unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("IMG_NAME=\"demo\""));
        assert!(content.contains("TARGET_HOSTNAME=\"demo\""));
        assert!(content.contains("DEPLOY_COMPRESSION=\"xz\""));
        assert!(content.contains("ENABLE_SSH=1"));
        assert!(content.contains("CLEAN=1"));
        assert!(content.contains("STAGE_LIST=\"stage0 stage1 stage2\""));
        assert!(!content.contains("old"));
    }
}
