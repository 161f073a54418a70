//! Fixtures shared by the unit tests: a fake pi-gen checkout and in-memory
//! stand-ins for the external collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tempfile::TempDir;
use time::OffsetDateTime;
use walkdir::WalkDir;

use crate::builder::ImageBuilder;
use crate::configure::{
    Configurator, BOOT_CMDLINE_FILE, BOOT_CONFIG_FILE, FIRST_BOOT_FILE, RESIZE_INIT_PATCH,
};
use crate::generator::{AFTER_INSTALL_LIST, BEFORE_INSTALL_LIST, DEPLOY_DIR};
use crate::initializer::{Initializer, DEPENDENCY_FILE};
use crate::installer::PackageInstaller;
use crate::loader::ConfigLoader;
use crate::repository::Repository;
use crate::settings::{BuildConfiguration, Compression, DEFAULT_CONFIG_TEMPLATE};
use crate::target::TargetConfig;

/// The crate's bundled resource directory.
pub fn resource_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("resources")
}

/// Copy the bundled templates and scripts to `dest`, so tests that write the
/// scratch sub-stage do not touch the source tree.
pub fn copy_resources(dest: &Path) {
    let root = resource_root();
    for entry in WalkDir::new(&root).min_depth(1) {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(&root).unwrap();
        if rel.starts_with("build") {
            continue;
        }
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
}

/// Minimal pi-gen checkout with the files the generator edits.
pub struct PipelineTree {
    _temp: TempDir,
    path: PathBuf,
}

impl PipelineTree {
    pub const CMDLINE: &'static str =
        "console=serial0,115200 console=tty1 root=ROOTDEV rootfstype=ext4 fsck.repair=yes rootwait\n";
    pub const BOOT_CONFIG: &'static str = "# For more options and information see\ndtparam=audio=on\n";
    pub const RESIZE_PATCH: &'static str = "\
--- stage2.orig/rootfs/boot/firmware/cmdline.txt
+++ stage2/rootfs/boot/firmware/cmdline.txt
@@ -1 +1 @@
-console=serial0,115200 console=tty1 root=ROOTDEV rootfstype=ext4 fsck.repair=yes rootwait
+console=serial0,115200 console=tty1 root=ROOTDEV rootfstype=ext4 fsck.repair=yes rootwait quiet init=/usr/lib/raspberrypi-sys-mods/firstboot
";
    pub const RC_LOCAL: &'static str = "#!/bin/sh -e\nexit 0\n";
    pub const DEPENDS: &'static str = "quilt\nparted\nqemu-arm-static:qemu-user-static\nmkfs.ext4:e2fsprogs\n";
    pub const BEFORE_INSTALL: &'static str = "[installed] package1\n[installed] package2\n";
    pub const AFTER_INSTALL: &'static str =
        "[installed] package1\n[installed] package2\n[installed,automatic] package3\n[installed] package4\n";

    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let tree = Self {
            path: temp.path().join("pi-gen"),
            _temp: temp,
        };

        fs::create_dir_all(tree.path.join("stage2/00-copies-and-fills")).unwrap();
        tree.write(BOOT_CMDLINE_FILE, Self::CMDLINE);
        tree.write(BOOT_CONFIG_FILE, Self::BOOT_CONFIG);
        tree.write(RESIZE_INIT_PATCH, Self::RESIZE_PATCH);
        tree.write(FIRST_BOOT_FILE, Self::RC_LOCAL);
        tree.write(DEPENDENCY_FILE, Self::DEPENDS);
        tree.write(&format!("{DEPLOY_DIR}/{BEFORE_INSTALL_LIST}"), Self::BEFORE_INSTALL);
        tree.write(&format!("{DEPLOY_DIR}/{AFTER_INSTALL_LIST}"), Self::AFTER_INSTALL);
        tree
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.path.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path.join(rel)).unwrap()
    }
}

#[derive(Debug, Clone)]
pub struct FakeRepository {
    path: PathBuf,
    refs: Vec<String>,
    checkouts: Arc<Mutex<Vec<String>>>,
}

impl FakeRepository {
    pub fn new(path: &Path, refs: &[&str]) -> Self {
        Self {
            path: path.to_path_buf(),
            refs: refs.iter().map(|r| r.to_string()).collect(),
            checkouts: Arc::default(),
        }
    }

    pub fn checkouts(&self) -> Vec<String> {
        self.checkouts.lock().unwrap().clone()
    }
}

impl Repository for FakeRepository {
    fn ref_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.refs.iter().any(|r| r == reference))
    }

    fn checkout(&self, reference: &str) -> Result<()> {
        self.checkouts.lock().unwrap().push(reference.to_string());
        Ok(())
    }

    fn working_tree_dir(&self) -> &Path {
        &self.path
    }
}

/// Records install attempts; optionally fails every package after the first `n`.
#[derive(Debug, Clone, Default)]
pub struct FakeInstaller {
    succeed_first: Option<usize>,
    attempted: Arc<Mutex<Vec<String>>>,
}

impl FakeInstaller {
    pub fn failing_after(n: usize) -> Self {
        Self {
            succeed_first: Some(n),
            attempted: Arc::default(),
        }
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn installed(&self) -> Vec<String> {
        let attempted = self.attempted();
        let n = self.succeed_first.unwrap_or(attempted.len()).min(attempted.len());
        attempted[..n].to_vec()
    }
}

impl PackageInstaller for FakeInstaller {
    fn install(&self, package: &str) -> bool {
        let mut attempted = self.attempted.lock().unwrap();
        attempted.push(package.to_string());
        self.succeed_first.map_or(true, |n| attempted.len() <= n)
    }
}

#[derive(Clone)]
pub struct FakeConfigurator {
    configuration: BuildConfiguration,
    configured: Arc<Mutex<Vec<String>>>,
}

impl Default for FakeConfigurator {
    fn default() -> Self {
        Self {
            configuration: BuildConfiguration::new(
                Compression::Xz,
                true,
                true,
                DEFAULT_CONFIG_TEMPLATE,
            ),
            configured: Arc::default(),
        }
    }
}

impl FakeConfigurator {
    pub fn configured(&self) -> Vec<String> {
        self.configured.lock().unwrap().clone()
    }
}

impl Configurator for FakeConfigurator {
    fn configuration(&self) -> &BuildConfiguration {
        &self.configuration
    }

    fn configure(&self, config: &TargetConfig) -> Result<()> {
        self.configured.lock().unwrap().push(config.name.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeLoader {
    targets: Vec<TargetConfig>,
    calls: Arc<Mutex<usize>>,
}

impl FakeLoader {
    pub fn new(targets: Vec<TargetConfig>) -> Self {
        Self {
            targets,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl ConfigLoader for FakeLoader {
    fn load_list(&self, _source: &Path) -> Result<Vec<TargetConfig>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.targets.clone())
    }
}

#[derive(Clone)]
pub struct FakeInitializer {
    path: PathBuf,
    configuration: BuildConfiguration,
    initialized: Arc<Mutex<Vec<String>>>,
}

impl FakeInitializer {
    pub fn new(path: &Path, compression: Compression) -> Self {
        Self {
            path: path.to_path_buf(),
            configuration: BuildConfiguration::new(compression, true, true, DEFAULT_CONFIG_TEMPLATE),
            initialized: Arc::default(),
        }
    }

    pub fn initialized(&self) -> Vec<String> {
        self.initialized.lock().unwrap().clone()
    }
}

impl Initializer for FakeInitializer {
    fn initialize(&self, config: &TargetConfig) -> Result<()> {
        self.initialized.lock().unwrap().push(config.name.clone());
        Ok(())
    }

    fn repository_path(&self) -> &Path {
        &self.path
    }

    fn configuration(&self) -> &BuildConfiguration {
        &self.configuration
    }
}

/// Reports a successful build started at a fixed instant.
#[derive(Clone)]
pub struct FakeBuilder {
    start: OffsetDateTime,
    commands: Arc<Mutex<Vec<String>>>,
}

impl FakeBuilder {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            start,
            commands: Arc::default(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl ImageBuilder for FakeBuilder {
    fn build(&self, command: &str) -> Result<OffsetDateTime> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(self.start)
    }
}
