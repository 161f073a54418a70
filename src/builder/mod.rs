//! Supervision of the pi-gen build process.

pub mod classify;
pub mod process;

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::error::GeneratorError;
use classify::{ClassifiedLine, LineClassifier, LineKind, Severity, DEFAULT_PIPELINE_MARKER};

/// Environment variable pi-gen uses as the date part of its image names.
pub const IMAGE_DATE_ENV: &str = "IMG_DATE";

pub trait ImageBuilder {
    /// Run one build with `command`; returns the instant it was launched.
    fn build(&self, command: &str) -> Result<OffsetDateTime>;
}

/// Runs the build command through `sh` inside the pipeline checkout.
#[derive(Debug, Clone)]
pub struct ProcessImageBuilder {
    repository_path: PathBuf,
    pipeline_marker: String,
}

impl ProcessImageBuilder {
    pub fn new(repository_path: impl Into<PathBuf>) -> Self {
        Self {
            repository_path: repository_path.into(),
            pipeline_marker: DEFAULT_PIPELINE_MARKER.to_string(),
        }
    }

    pub fn with_pipeline_marker(mut self, marker: &str) -> Self {
        self.pipeline_marker = marker.to_string();
        self
    }

    pub fn repository_path(&self) -> &Path {
        &self.repository_path
    }

    /// Classifier for one build. pi-gen reports absolute stage paths, so a
    /// relative checkout path is resolved before it is stripped from them.
    pub fn classifier(&self) -> LineClassifier {
        let path = std::path::absolute(&self.repository_path)
            .unwrap_or_else(|_| self.repository_path.clone());
        LineClassifier::new(&path.to_string_lossy()).with_pipeline_marker(&self.pipeline_marker)
    }
}

impl ImageBuilder for ProcessImageBuilder {
    fn build(&self, command: &str) -> Result<OffsetDateTime> {
        let start_time = now();
        let image_date = image_date(start_time)?;

        info!(
            path = %self.repository_path.display(),
            command,
            start_time = %start_time,
            "Building image"
        );

        let mut classifier = self.classifier();

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.repository_path)
            .env(IMAGE_DATE_ENV, &image_date);

        let started = Instant::now();
        let status = process::run_streaming(&mut cmd, |severity, line| {
            let classified = classifier.process(line, severity);
            emit(line, &classified);
        })
        .with_context(|| format!("running build command '{command}'"))?;

        info!(
            command,
            return_code = status.code().unwrap_or(-1),
            elapsed_time = %format!("{:.3}s", started.elapsed().as_secs_f64()),
            "Command execution completed"
        );

        if !status.success() {
            let stage = classifier.current_stage().map(str::to_string);
            error!(
                path = %self.repository_path.display(),
                command,
                return_code = status.code().unwrap_or(-1),
                stage = stage.as_deref().unwrap_or("none"),
                "Failed to build image"
            );
            return Err(GeneratorError::BuildFailed {
                command: command.to_string(),
                code: status.code(),
                stage,
            }
            .into());
        }

        info!(path = %self.repository_path.display(), command, "Image build completed");

        Ok(start_time)
    }
}

fn emit(line: &str, classified: &ClassifiedLine) {
    let stage = classified.stage.as_deref().unwrap_or("none");
    match classified.kind {
        LineKind::Passthrough => println!("{line}"),
        LineKind::Pipeline => info!("{line}"),
        LineKind::Output(Severity::Debug) => debug!(stage, "{line}"),
        LineKind::Output(Severity::Warning) => warn!(stage, "{line}"),
    }
}

/// Local time when the offset can be determined, UTC otherwise.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `YYYY-MM-DD`, as pi-gen writes it into image names.
pub fn image_date(instant: OffsetDateTime) -> Result<String> {
    instant
        .format(format_description!("[year]-[month]-[day]"))
        .context("formatting image date")
}
