//! Classification of build output lines and pipeline stage tracking.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Marker the package installer embeds in its own coloured output.
pub const INSTALLER_MARKER: &str = "package-installer\x1b";

/// Substring of every pi-gen log line (the checkout path it reports).
pub const DEFAULT_PIPELINE_MARKER: &str = "/pi-gen";

/// Stream a line was read from, mapped to a default log severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Standard output.
    Debug,
    /// Standard error.
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Pass through to the console untouched.
    Passthrough,
    /// pi-gen's own log line, logged at info.
    Pipeline,
    /// Anything else, logged at the stream's severity with the current stage.
    Output(Severity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StageMarker {
    Begin(String),
    End,
}

fn stage_marker(line: &str) -> Option<StageMarker> {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    let re = MARKER
        .get_or_init(|| Regex::new(r"^\[.*\] (Begin|End) (.*)$").expect("stage marker regex"));
    let caps = re.captures(line)?;
    match &caps[1] {
        "Begin" => Some(StageMarker::Begin(caps[2].to_string())),
        _ => Some(StageMarker::End),
    }
}

/// Stages pi-gen is currently inside, innermost last.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StageStack {
    stages: Vec<String>,
}

impl StageStack {
    pub fn current(&self) -> Option<&str> {
        self.stages.last().map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    fn push(&mut self, stage: String) {
        self.stages.push(stage);
    }

    fn pop(&mut self) -> Option<String> {
        self.stages.pop()
    }
}

/// Stage stack change caused by a pipeline line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Entered(String),
    Left(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub kind: LineKind,
    pub stage: Option<String>,
}

/// Classifies the lines of one build and tracks its stage stack.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    repository_path: String,
    pipeline_marker: String,
    stack: StageStack,
}

impl LineClassifier {
    pub fn new(repository_path: &str) -> Self {
        Self {
            repository_path: repository_path.trim_end_matches('/').to_string(),
            pipeline_marker: DEFAULT_PIPELINE_MARKER.to_string(),
            stack: StageStack::default(),
        }
    }

    pub fn with_pipeline_marker(mut self, marker: &str) -> Self {
        self.pipeline_marker = marker.to_string();
        self
    }

    pub fn classify(&self, line: &str, severity: Severity) -> LineKind {
        if line.contains(INSTALLER_MARKER) {
            LineKind::Passthrough
        } else if self.is_pipeline_log(line) {
            LineKind::Pipeline
        } else {
            LineKind::Output(severity)
        }
    }

    fn is_pipeline_log(&self, line: &str) -> bool {
        line.starts_with('[')
            && (line.contains(&self.pipeline_marker) || stage_marker(line).is_some())
    }

    /// Update the stage stack from a pipeline line. `End` pops whatever is on
    /// top without checking it matches the last `Begin`.
    pub fn track(&mut self, line: &str) -> Option<StageEvent> {
        match stage_marker(line)? {
            StageMarker::Begin(name) => {
                let stage = self.strip_repository_path(&name).to_string();
                self.stack.push(stage.clone());
                Some(StageEvent::Entered(stage))
            }
            StageMarker::End => Some(StageEvent::Left(self.stack.pop())),
        }
    }

    fn strip_repository_path<'a>(&self, name: &'a str) -> &'a str {
        if self.repository_path.is_empty() {
            return name;
        }
        match name.strip_prefix(self.repository_path.as_str()) {
            Some(rest) => rest.trim_start_matches('/'),
            None => name,
        }
    }

    /// Classify `line`, updating the stage stack for pipeline lines, and
    /// attribute it to the stage current afterwards.
    pub fn process(&mut self, line: &str, severity: Severity) -> ClassifiedLine {
        let kind = self.classify(line, severity);
        if kind == LineKind::Pipeline {
            if let Some(StageEvent::Left(None)) = self.track(line) {
                debug!(line, "Stage end without matching begin");
            }
        }
        ClassifiedLine {
            kind,
            stage: self.current_stage().map(str::to_string),
        }
    }

    pub fn current_stage(&self) -> Option<&str> {
        self.stack.current()
    }

    pub fn stack(&self) -> &StageStack {
        &self.stack
    }
}
