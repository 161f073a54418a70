//! Customized Raspberry Pi OS images on top of pi-gen.
//!
//! The generator prepares a pi-gen checkout for one named target, runs the
//! pi-gen build and collects the resulting image:
//!
//! ```text
//! ImageGenerator
//!     │
//!     ├── BuildInitializer   checkout ref, install host dependencies
//!     │     └── BuildConfigurator
//!     │           ├── boot_files    cmdline.txt / config.txt / resize patch
//!     │           ├── sub_stage     scripts + JSON config in a scratch dir
//!     │           ├── append        copy into stageN/<next>-install-packages
//!     │           └── build_config  pi-gen `config`
//!     │
//!     ├── ProcessImageBuilder  runs ./build.sh, drains stdout/stderr,
//!     │                        tracks pi-gen's Begin/End stage markers
//!     │
//!     └── move image, export target JSON and installed package list
//! ```
//!
//! External tools sit behind traits ([`Repository`], [`PackageInstaller`],
//! [`ConfigLoader`], [`TemplateRenderer`]) so the core can run against fakes.

pub mod builder;
pub mod configure;
pub mod error;
pub mod generator;
pub mod initializer;
pub mod installer;
pub mod loader;
pub mod preflight;
pub mod repository;
pub mod settings;
pub mod target;
pub mod template;

#[cfg(test)]
mod test_support;

pub use builder::{ImageBuilder, ProcessImageBuilder};
pub use configure::{BuildConfigurator, Configurator};
pub use error::GeneratorError;
pub use generator::{ImageGenerator, ImageProperties};
pub use initializer::{BuildInitializer, Initializer};
pub use installer::{AptInstaller, PackageInstaller};
pub use loader::{ConfigLoader, JsonConfigLoader};
pub use repository::{GitRepository, Repository};
pub use settings::{BuildConfiguration, Compression};
pub use target::TargetConfig;
pub use template::{FileTemplateRenderer, TemplateRenderer};
