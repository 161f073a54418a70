//! Target image descriptions as loaded from the target configuration JSON.

use serde::{Deserialize, Serialize};

fn default_stage() -> u32 {
    2
}

/// One buildable image variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub version: String,
    /// Pipeline repository reference (branch, tag) to build from.
    pub reference: String,
    /// Pipeline stage extended with the generated sub-stage.
    #[serde(default = "default_stage")]
    pub stage: u32,
    pub packages: Vec<PackageConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_cmdline: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_config: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_boot: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_install: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install: Option<Vec<String>>,
}

impl TargetConfig {
    pub fn new(name: &str, version: &str, reference: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            reference: reference.to_string(),
            stage: default_stage(),
            packages: Vec::new(),
            sources: None,
            boot_cmdline: None,
            boot_config: None,
            first_boot: None,
            pre_install: None,
            post_install: None,
        }
    }
}

/// Package installed into the image by the generated sub-stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseConfig>,
}

impl PackageConfig {
    pub fn named(package: &str) -> Self {
        Self {
            package: package.to_string(),
            version: None,
            file_url: None,
            release: None,
        }
    }
}

/// GitHub release asset a package is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub matcher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Extra APT source registered inside the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_server: Option<String>,
}

/// Serialize as 2-space indented JSON followed by a newline.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}
