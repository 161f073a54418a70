use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use raspbian_image_generator::loader::{download_config, is_url};
use raspbian_image_generator::settings::{
    load_settings, Settings, DEFAULT_BUILD_COMMAND, DEFAULT_CONFIG_TEMPLATE,
    DEFAULT_OUTPUT_PATTERN,
};
use raspbian_image_generator::{
    preflight, AptInstaller, BuildConfiguration, BuildConfigurator, BuildInitializer, Compression,
    FileTemplateRenderer, GitRepository, ImageGenerator, JsonConfigLoader, ProcessImageBuilder,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_DOWNLOAD_DIR: &str = "/tmp/config";
const DEFAULT_REPOSITORY_PATH: &str = "/tmp/pi-gen";
const DEFAULT_REPOSITORY_URL: &str = "https://github.com/RPi-Distro/pi-gen.git";
const DEFAULT_OUTPUT_DIR: &str = "images";
const RESOURCE_ROOT_ENV: &str = "RASPBIAN_IMAGE_GENERATOR_RESOURCES";

/// Generate a customized Raspberry Pi OS image with pi-gen.
#[derive(Debug, Parser)]
#[command(name = "raspbian-image-generator", version)]
struct Cli {
    /// Target configuration list: a JSON file or an http(s) URL
    target_config: String,

    /// Name of the target to build
    target_name: String,

    /// Also write log output to this file
    #[arg(short = 'f', long)]
    log_file: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. info, debug)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// TOML file with default values for the options below
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory for downloaded target configurations
    #[arg(short = 'd', long)]
    download: Option<PathBuf>,

    /// pi-gen checkout location
    #[arg(short = 'p', long)]
    repository_path: Option<PathBuf>,

    /// pi-gen repository cloned when the checkout is missing
    #[arg(short = 'u', long)]
    repository_url: Option<String>,

    /// Directory receiving generated images
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Output file name pattern; {target} and {version} are substituted
    #[arg(long)]
    output_pattern: Option<String>,

    /// Directory holding the templates and sub-stage scripts
    #[arg(long)]
    resource_root: Option<PathBuf>,

    /// pi-gen config template, relative to the resource root
    #[arg(short = 't', long)]
    config_template: Option<PathBuf>,

    #[arg(short = 'c', long, value_enum)]
    compression: Option<Compression>,

    #[arg(long, overrides_with = "no_enable_ssh")]
    enable_ssh: bool,

    #[arg(long, overrides_with = "enable_ssh")]
    no_enable_ssh: bool,

    #[arg(long, overrides_with = "no_clean_build")]
    clean_build: bool,

    #[arg(long, overrides_with = "clean_build")]
    no_clean_build: bool,

    /// Command run in the checkout to build the image
    #[arg(long)]
    build_command: Option<String>,
}

/// Fully resolved options: command line, then settings file, then defaults.
#[derive(Debug)]
struct Options {
    download: PathBuf,
    repository_path: PathBuf,
    repository_url: String,
    output: PathBuf,
    output_pattern: String,
    resource_root: PathBuf,
    build_command: String,
    configuration: BuildConfiguration,
}

impl Options {
    /// Checkout, download and output paths are made absolute against the
    /// current directory.
    fn resolve(cli: &Cli, settings: Settings) -> Result<Self> {
        let enable_ssh = flag(cli.enable_ssh, cli.no_enable_ssh)
            .or(settings.enable_ssh)
            .unwrap_or(true);
        let clean_build = flag(cli.clean_build, cli.no_clean_build)
            .or(settings.clean_build)
            .unwrap_or(true);

        Ok(Self {
            download: absolute(
                cli.download
                    .clone()
                    .or(settings.download)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            )?,
            repository_path: absolute(
                cli.repository_path
                    .clone()
                    .or(settings.repository_path)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_REPOSITORY_PATH)),
            )?,
            repository_url: cli
                .repository_url
                .clone()
                .or(settings.repository_url)
                .unwrap_or_else(|| DEFAULT_REPOSITORY_URL.to_string()),
            output: absolute(
                cli.output
                    .clone()
                    .or(settings.output)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            )?,
            output_pattern: cli
                .output_pattern
                .clone()
                .or(settings.output_pattern)
                .unwrap_or_else(|| DEFAULT_OUTPUT_PATTERN.to_string()),
            resource_root: cli
                .resource_root
                .clone()
                .or(settings.resource_root)
                .unwrap_or_else(default_resource_root),
            build_command: cli
                .build_command
                .clone()
                .or(settings.build_command)
                .unwrap_or_else(|| DEFAULT_BUILD_COMMAND.to_string()),
            configuration: BuildConfiguration::new(
                cli.compression.or(settings.compression).unwrap_or_default(),
                enable_ssh,
                clean_build,
                cli.config_template
                    .clone()
                    .or(settings.config_template)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_TEMPLATE)),
            ),
        })
    }
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::path::absolute(&path).with_context(|| format!("resolving path '{}'", path.display()))
}

fn flag(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (_, true) => Some(false),
        (true, false) => Some(true),
        (false, false) => None,
    }
}

fn default_resource_root() -> PathBuf {
    std::env::var_os(RESOURCE_ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")).join("resources"))
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file '{}'", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    let options = Options::resolve(&cli, settings)?;

    info!(
        target = %cli.target_name,
        config = %cli.target_config,
        repository = %options.repository_path.display(),
        compression = %options.configuration.compression,
        "Starting image generation"
    );

    preflight::check_host_tools(is_url(&cli.target_config))?;

    let config_path = download_config(&cli.target_config, &options.download)?;
    let repository = GitRepository::open_or_clone(&options.repository_path, &options.repository_url)?;

    let configurator = BuildConfigurator::new(
        &options.resource_root,
        &options.repository_path,
        options.configuration.clone(),
        Box::new(FileTemplateRenderer::new(&options.resource_root)),
    );
    let initializer = BuildInitializer::new(
        Box::new(repository),
        Box::new(AptInstaller),
        Box::new(configurator),
    );
    let builder = ProcessImageBuilder::new(&options.repository_path)
        .with_pipeline_marker(&options.repository_path.to_string_lossy());

    let generator = ImageGenerator::new(
        config_path,
        Box::new(JsonConfigLoader),
        Box::new(initializer),
        Box::new(builder),
        &options.output,
    )
    .with_output_pattern(&options.output_pattern)
    .with_build_command(&options.build_command);

    let config = generator.generate(&cli.target_name)?;
    let image = generator.image_properties(&config).path();

    info!(target = %config.name, version = %config.version, image = %image.display(), "Image generated");
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        tracing::error!(error = %format!("{e:#}"), "Image generation failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
