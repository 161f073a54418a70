//! Fatal run signals.
//!
//! Every failure aborts the run. These variants are the ones an operator needs
//! to tell apart; they travel inside `anyhow::Error` and can be recovered with
//! `err.downcast_ref::<GeneratorError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The target reference is not known to the pipeline repository.
    #[error("reference '{reference}' does not exist in the pipeline repository")]
    InvalidReference { reference: String },

    /// A build-time host dependency could not be installed.
    #[error("failed to install build dependency '{package}'")]
    DependencyInstall { package: String },

    /// The external build command exited unsuccessfully.
    #[error(
        "build command '{command}' failed with {} (stage: {})",
        describe_code(*code),
        stage.as_deref().unwrap_or("unknown")
    )]
    BuildFailed {
        command: String,
        code: Option<i32>,
        stage: Option<String>,
    },

    /// The build reported success but the expected image is not there.
    #[error("expected image not found at '{}'", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("target '{target}' not found; known targets: {}", known.join(", "))]
    TargetNotFound { target: String, known: Vec<String> },

    #[error("target '{target}' is defined more than once")]
    DuplicateTarget { target: String },
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "termination by signal".to_string(),
    }
}
