use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    Cpp,
    Java,
    Python,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "c++" | "cpp" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "python" | "py" => Some(Language::Python),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Cpp => write!(f, "C++"),
            Language::Java => write!(f, "Java"),
            Language::Python => write!(f, "Python"),
        }
    }
}

/// Everything needed to execute one test slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    pub slot: usize,
    /// Compiled binary for C++, class output directory for Java.
    pub executable_path: PathBuf,
    pub source_path: PathBuf,
    pub language: Language,
    /// Launcher for interpreted/VM languages, e.g. `python3` or `java`.
    pub run_command: String,
    pub extra_args: String,
    pub stdin: String,
    pub time_limit_ms: u64,
}

impl RunRequest {
    /// The file or directory that has to exist before the request can run.
    pub fn artifact_path(&self) -> &Path {
        match self.language {
            Language::Cpp | Language::Java => &self.executable_path,
            Language::Python => &self.source_path,
        }
    }

    pub fn working_directory(&self) -> PathBuf {
        let artifact = self.artifact_path();
        match self.language {
            Language::Java => artifact.to_path_buf(),
            Language::Cpp | Language::Python => artifact
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    pub fn for_slot(&self, slot: usize, stdin: &str) -> Self {
        Self {
            slot,
            stdin: stdin.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OutcomeKind {
    Completed,
    TimedOut,
    OutputLimitExceeded(OutputStream),
    KilledExternally,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub slot: usize,
    pub run_id: Uuid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed or terminated by a signal.
    pub exit_code: Option<i32>,
    pub elapsed_ms: u64,
    pub kind: OutcomeKind,
}

/// Why a run never got going.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum StartFailure {
    #[error("The file {path} doesn't exist, please compile first")]
    MissingArtifact { path: PathBuf },
    #[error("Failed to get run command, it's probably a bug")]
    EmptyCommand,
    #[error("Slot {slot} is still running a previous request")]
    AlreadyRunning { slot: usize },
    #[error("Failed to start running ({msg}), please compile first")]
    Spawn { msg: String },
    #[error(
        "Failed to start detached execution ({msg}), please check the terminal emulator settings"
    )]
    Detached { msg: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunEvent {
    pub slot: usize,
    pub kind: RunEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEventKind {
    Started,
    Finished(RunOutcome),
    TimedOut(RunOutcome),
    OutputLimitExceeded {
        stream: OutputStream,
        outcome: RunOutcome,
    },
    FailedToStart(StartFailure),
    Killed(RunOutcome),
}

impl RunEventKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunEventKind::Started)
    }

    pub fn into_result(self) -> Option<Result<RunOutcome, StartFailure>> {
        match self {
            RunEventKind::Started => None,
            RunEventKind::Finished(outcome)
            | RunEventKind::TimedOut(outcome)
            | RunEventKind::OutputLimitExceeded { outcome, .. }
            | RunEventKind::Killed(outcome) => Some(Ok(outcome)),
            RunEventKind::FailedToStart(reason) => Some(Err(reason)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub expected: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    /// Nothing to compare against, or the program printed nothing.
    Unknown,
    RuntimeError { exit_code: Option<i32> },
    TimeLimitExceeded,
    OutputLimitExceeded(OutputStream),
    Killed,
    FailedToStart { reason: StartFailure },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SlotState {
    Pending,
    Running,
    Done {
        verdict: Verdict,
        outcome: Option<RunOutcome>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub slot: usize,
    pub state: SlotState,
}

impl SlotReport {
    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.state {
            SlotState::Done { verdict, .. } => Some(verdict),
            _ => None,
        }
    }
}
