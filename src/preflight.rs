//! Preflight checks for the build host.
//!
//! Verifies that the tools the generator shells out to are installed before
//! anything in the pipeline checkout is touched.

use anyhow::{bail, Result};

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools needed for every run.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("git", "git"),
    ("apt-get", "apt"),
    ("dpkg-query", "dpkg"),
];

/// Needed only when the target configuration is given as a URL.
pub const DOWNLOAD_TOOLS: &[(&str, &str)] = &[("curl", "curl")];

/// Check that specific tools are available.
///
/// # Returns
///
/// * `Ok(())` if all tools are found
/// * `Err` with list of missing tools and their packages
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check the tools for a run; `remote_config` adds the download tools.
pub fn check_host_tools(remote_config: bool) -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)?;
    if remote_config {
        check_required_tools(DOWNLOAD_TOOLS)?;
    }
    Ok(())
}
