//! Host package installation for build-time dependencies.

use std::process::Command;

use tracing::{debug, warn};

pub trait PackageInstaller {
    /// Install `package` on the build host. Returns whether it is installed afterwards.
    fn install(&self, package: &str) -> bool;
}

/// Installs packages with `apt-get`, skipping ones `dpkg-query` already reports.
#[derive(Debug, Default, Clone)]
pub struct AptInstaller;

impl AptInstaller {
    fn is_installed(&self, package: &str) -> bool {
        Command::new("dpkg-query")
            .args(["-W", "-f=${Status}", package])
            .output()
            .map(|o| o.status.success() && installed_status(&String::from_utf8_lossy(&o.stdout)))
            .unwrap_or(false)
    }
}

impl PackageInstaller for AptInstaller {
    fn install(&self, package: &str) -> bool {
        if self.is_installed(package) {
            debug!(package, "Package already installed");
            return true;
        }

        match Command::new("apt-get")
            .args(["install", "-y", package])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .output()
        {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    package,
                    code = output.status.code().unwrap_or(-1),
                    stderr = %stderr.trim(),
                    "apt-get install failed"
                );
                false
            }
            Err(e) => {
                warn!(package, error = %e, "Failed to run apt-get");
                false
            }
        }
    }
}

fn installed_status(status: &str) -> bool {
    status.trim().ends_with(" installed")
}
