use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc::UnboundedSender, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::RunnerConfig;
use crate::core::command::{command_line, split_command};
use crate::core::domain::{
    Language, OutcomeKind, OutputStream, RunEvent, RunEventKind, RunOutcome, RunRequest,
    StartFailure,
};
use crate::core::traits::launcher::DetachedLauncher;

const READ_CHUNK_SIZE: usize = 8192;
/// How long pipes are still read after the process exits. Background
/// children may keep them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KillReason {
    External,
    Teardown,
}

#[derive(Debug)]
enum Termination {
    Exited(ExitStatus),
    WaitFailed,
    TimedOut,
    OutputLimit(OutputStream),
    Killed(KillReason),
}

#[derive(Debug)]
struct ActiveRun {
    run_id: Uuid,
    kill_tx: Option<oneshot::Sender<KillReason>>,
    /// Set by the supervisor right before the terminal event goes out.
    done: Arc<AtomicBool>,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        !self.done.load(Ordering::Acquire)
    }
}

/// Executes one external program at a time for a single test slot.
///
/// Every method returns immediately. Progress is reported as [`RunEvent`]s
/// on the channel given to [`Runner::new`]; each attached run ends with
/// exactly one terminal event, the first one detected. Dropping a runner
/// with a child still alive kills it and reports [`RunEventKind::Killed`].
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct Runner {
    slot: usize,
    config: Arc<RunnerConfig>,
    launcher: Arc<dyn DetachedLauncher>,
    events: UnboundedSender<RunEvent>,
    active: Option<ActiveRun>,
}

impl Runner {
    pub fn new(
        slot: usize,
        config: Arc<RunnerConfig>,
        launcher: Arc<dyn DetachedLauncher>,
        events: UnboundedSender<RunEvent>,
    ) -> Self {
        Self {
            slot,
            config,
            launcher,
            events,
            active: None,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(ActiveRun::is_running)
    }

    #[tracing::instrument(skip(self, request), fields(slot = self.slot))]
    pub fn run(&mut self, request: RunRequest) {
        tracing::info!(
            "Run requested: executable={:?}, source={:?}, language={}, run_command={:?}, args={:?}, time_limit_ms={}",
            request.executable_path,
            request.source_path,
            request.language,
            request.run_command,
            request.extra_args,
            request.time_limit_ms
        );
        if request.slot != self.slot {
            tracing::warn!("Request for slot {} sent to runner {}", request.slot, self.slot);
        }

        if self.is_running() {
            self.fail(StartFailure::AlreadyRunning { slot: self.slot });
            return;
        }
        self.active = None;

        let request = canonicalize_source(request);
        if !request.artifact_path().exists() {
            self.fail(StartFailure::MissingArtifact {
                path: request.artifact_path().to_path_buf(),
            });
            return;
        }

        let mut argv = split_command(&command_line(&request, &self.config.java_class_name));
        if argv.is_empty() {
            self.fail(StartFailure::EmptyCommand);
            return;
        }
        let program = argv.remove(0);

        let mut cmd = Command::new(&program);
        cmd.args(&argv)
            .current_dir(request.working_directory())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.fail(StartFailure::Spawn {
                    msg: format!("{}: {}", program, e),
                });
                return;
            }
        };

        let run_id = Uuid::new_v4();
        tracing::debug!("Process {:?} started for run {}", child.id(), run_id);
        emit(&self.events, self.slot, RunEventKind::Started);
        feed_stdin(&mut child, request.stdin);

        let (kill_tx, kill_rx) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));
        let supervision = Supervision {
            slot: self.slot,
            run_id,
            started_at,
            start,
            time_limit: Duration::from_millis(request.time_limit_ms),
            output_limit: self.config.output_length_limit,
            events: self.events.clone(),
            done: done.clone(),
        };
        tokio::spawn(supervision.supervise(child, kill_rx));

        self.active = Some(ActiveRun {
            run_id,
            kill_tx: Some(kill_tx),
            done,
        });
    }

    /// Opens the program in a terminal window. Output is not captured and
    /// no limits apply.
    #[tracing::instrument(skip(self, request), fields(slot = self.slot))]
    pub fn run_detached(&mut self, request: RunRequest) {
        let request = canonicalize_source(request);
        let command = command_line(&request, &self.config.java_class_name);
        tracing::info!("Detached run: {}", command);

        match self
            .launcher
            .launch_detached(&command, &request.working_directory())
        {
            Ok(()) => emit(&self.events, self.slot, RunEventKind::Started),
            Err(e) => self.fail(StartFailure::Detached { msg: e.to_string() }),
        }
    }

    /// Kills the running process, if any. Only the first call for a run
    /// has an effect.
    pub fn kill(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(kill_tx) = active.kill_tx.take() else {
            return;
        };
        if kill_tx.send(KillReason::External).is_err() {
            tracing::debug!("Run {} already finished, nothing to kill", active.run_id);
        }
    }

    fn fail(&self, reason: StartFailure) {
        tracing::error!("Slot {} failed to start: {}", self.slot, reason);
        emit(&self.events, self.slot, RunEventKind::FailedToStart(reason));
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if !active.is_running() {
            return;
        }
        let Some(kill_tx) = active.kill_tx.take() else {
            return;
        };
        if kill_tx.send(KillReason::Teardown).is_ok() {
            tracing::warn!(
                "Runner at slot {} was running and forcefully killed",
                self.slot
            );
        }
    }
}

fn canonicalize_source(mut request: RunRequest) -> RunRequest {
    if request.language == Language::Python {
        if let Ok(path) = std::fs::canonicalize(&request.source_path) {
            request.source_path = path;
        }
    }
    request
}

fn emit(events: &UnboundedSender<RunEvent>, slot: usize, kind: RunEventKind) {
    if events.send(RunEvent { slot, kind }).is_err() {
        tracing::debug!("Event receiver for slot {} is gone", slot);
    }
}

/// Writes the payload in the background and closes the pipe, so a child
/// that never reads its input cannot stall the runner.
fn feed_stdin(child: &mut Child, payload: String) {
    let Some(mut stdin) = child.stdin.take() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = stdin.write_all(payload.as_bytes()).await {
            tracing::debug!("Child stopped reading stdin: {}", e);
        }
    });
}

async fn read_chunk<R>(pipe: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match pipe {
        Some(pipe) => pipe.read(buf).await,
        None => Ok(0),
    }
}

/// Appends `chunk` and reports whether the limit is now exceeded.
fn accumulate(acc: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    acc.extend_from_slice(chunk);
    acc.len() > limit
}

struct Supervision {
    slot: usize,
    run_id: Uuid,
    started_at: chrono::DateTime<chrono::Utc>,
    start: Instant,
    time_limit: Duration,
    output_limit: usize,
    events: UnboundedSender<RunEvent>,
    done: Arc<AtomicBool>,
}

impl Supervision {
    async fn supervise(self, mut child: Child, mut kill_rx: oneshot::Receiver<KillReason>) {
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut stdout_acc = Vec::new();
        let mut stderr_acc = Vec::new();
        let mut stdout_buf = vec![0u8; READ_CHUNK_SIZE];
        let mut stderr_buf = vec![0u8; READ_CHUNK_SIZE];

        let deadline = tokio::time::sleep(self.time_limit.saturating_sub(self.start.elapsed()));
        tokio::pin!(deadline);
        let mut exited: Option<(ExitStatus, Duration)> = None;

        let termination = loop {
            if let Some((status, _)) = exited {
                if stdout.is_none() && stderr.is_none() {
                    break Termination::Exited(status);
                }
            }
            tokio::select! {
                reason = &mut kill_rx, if exited.is_none() => {
                    break Termination::Killed(reason.unwrap_or(KillReason::Teardown));
                }
                _ = &mut deadline => {
                    if let Some((status, _)) = exited {
                        tracing::debug!("Run {} exited with its pipes still open", self.run_id);
                        break Termination::Exited(status);
                    }
                    // The child may have exited on the same tick.
                    break match child.try_wait() {
                        Ok(Some(status)) => Termination::Exited(status),
                        _ => Termination::TimedOut,
                    };
                }
                read = read_chunk(&mut stdout, &mut stdout_buf), if stdout.is_some() => {
                    match read {
                        Ok(0) | Err(_) => stdout = None,
                        Ok(n) => {
                            if accumulate(&mut stdout_acc, &stdout_buf[..n], self.output_limit) {
                                break Termination::OutputLimit(OutputStream::Stdout);
                            }
                        }
                    }
                }
                read = read_chunk(&mut stderr, &mut stderr_buf), if stderr.is_some() => {
                    match read {
                        Ok(0) | Err(_) => stderr = None,
                        Ok(n) => {
                            if accumulate(&mut stderr_acc, &stderr_buf[..n], self.output_limit) {
                                break Termination::OutputLimit(OutputStream::Stderr);
                            }
                        }
                    }
                }
                status = child.wait(), if exited.is_none() => {
                    match status {
                        Ok(status) => {
                            exited = Some((status, self.start.elapsed()));
                            deadline.as_mut().reset(Instant::now() + DRAIN_GRACE);
                        }
                        Err(e) => {
                            tracing::error!("Failed to wait for process of run {}: {}", self.run_id, e);
                            break Termination::WaitFailed;
                        }
                    }
                }
            }
        };
        drop(kill_rx);

        let exit_code = match &termination {
            Termination::Exited(status) => status.code(),
            _ => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill process of run {}: {}", self.run_id, e);
                }
                None
            }
        };

        if let Termination::OutputLimit(stream) = &termination {
            match stream {
                OutputStream::Stdout => stdout_acc.truncate(self.output_limit),
                OutputStream::Stderr => stderr_acc.truncate(self.output_limit),
            }
        }

        let kind = match &termination {
            Termination::Exited(_) => OutcomeKind::Completed,
            Termination::TimedOut => OutcomeKind::TimedOut,
            Termination::OutputLimit(stream) => OutcomeKind::OutputLimitExceeded(*stream),
            Termination::Killed(_) | Termination::WaitFailed => OutcomeKind::KilledExternally,
        };
        let outcome = RunOutcome {
            slot: self.slot,
            run_id: self.run_id,
            started_at: self.started_at,
            stdout: String::from_utf8_lossy(&stdout_acc).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_acc).into_owned(),
            exit_code,
            elapsed_ms: exited
                .map_or_else(|| self.start.elapsed(), |(_, elapsed)| elapsed)
                .as_millis() as u64,
            kind,
        };

        let event = match termination {
            Termination::Exited(_) => {
                tracing::info!(
                    "Run {} finished in {}ms with exit code {:?}",
                    self.run_id,
                    outcome.elapsed_ms,
                    outcome.exit_code
                );
                RunEventKind::Finished(outcome)
            }
            Termination::TimedOut => {
                tracing::info!(
                    "Run {} was running and forcefully killed because the time limit was reached",
                    self.run_id
                );
                RunEventKind::TimedOut(outcome)
            }
            Termination::OutputLimit(stream) => {
                tracing::info!(
                    "Run {} was running and forcefully killed because the {} limit was reached",
                    self.run_id,
                    stream
                );
                RunEventKind::OutputLimitExceeded { stream, outcome }
            }
            Termination::Killed(reason) => {
                tracing::info!("Run {} killed ({:?})", self.run_id, reason);
                RunEventKind::Killed(outcome)
            }
            Termination::WaitFailed => RunEventKind::Killed(outcome),
        };
        self.done.store(true, Ordering::Release);
        emit(&self.events, self.slot, event);
    }
}
