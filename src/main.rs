//! `cprunner` -- runs a compiled solution against a directory of test
//! cases, or opens it in a terminal window.
//!
//! | Variable               | Default                         |
//! |------------------------|---------------------------------|
//! | `CPRUNNER_RUN_COMMAND` | `java` / `python3` per language |
//! | `CPRUNNER_RUN_ARGS`    | empty                           |
//!
//! plus the runner settings read by `RunnerConfig::from_env`.

use std::panic;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use itertools::Itertools;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cprunner::config::{ConfigError, RunnerConfig};
use cprunner::core::domain::{
    Language, RunEventKind, RunRequest, SlotReport, SlotState, StartFailure, TestCase, Verdict,
};
use cprunner::core::pipeline::judging::judge_all;
use cprunner::native::detached::platform_launcher;
use cprunner::native::executor::RunnerExecutor;
use cprunner::native::runner::Runner;

const DEFAULT_TIME_LIMIT_MS: u64 = 5000;
const USAGE: &str = "usage:
  cprunner judge [--json] <cpp|java|python> <artifact> <cases-dir> [time-limit-ms]
  cprunner detached <cpp|java|python> <artifact>";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}\n{usage}", usage = USAGE)]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read test cases from {path}: {source}")]
    Cases {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Start(#[from] StartFailure),
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<ExitCode, CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    set_panic_hook();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = RunnerConfig::from_env()?;

    match args.first().map(String::as_str) {
        Some("judge") => judge(&args[1..], config).await,
        Some("detached") => detached(&args[1..], config).await,
        Some(other) => Err(CliError::Usage(format!("unknown command {:?}", other))),
        None => Err(CliError::Usage("missing command".to_string())),
    }
}

async fn judge(args: &[String], config: RunnerConfig) -> Result<ExitCode, CliError> {
    let json = args.iter().any(|arg| arg == "--json");
    let args: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|arg| *arg != "--json")
        .collect();
    let [language, artifact, cases_dir, rest @ ..] = args.as_slice() else {
        return Err(CliError::Usage("judge needs a language, an artifact and a directory".to_string()));
    };
    let time_limit_ms = match rest.first() {
        Some(value) => value
            .parse()
            .map_err(|_| CliError::Usage(format!("invalid time limit {:?}", value)))?,
        None => DEFAULT_TIME_LIMIT_MS,
    };

    let template = build_request(language, artifact, time_limit_ms)?;
    let cases = load_cases(Path::new(cases_dir)).await?;
    if cases.is_empty() {
        return Err(CliError::Usage(format!("no *.in files in {}", cases_dir)));
    }

    let (tx, mut rx) = mpsc::channel::<SlotReport>(cases.len() * 3);
    let progress = tokio::spawn(async move {
        while let Some(report) = rx.recv().await {
            if matches!(report.state, SlotState::Running) {
                tracing::debug!("Slot {} running", report.slot + 1);
            }
        }
    });

    let executor = Arc::new(RunnerExecutor::new(config));
    let reports = judge_all(executor, &template, &cases, &tx).await;
    drop(tx);
    if let Err(e) = progress.await {
        tracing::warn!("Progress task failed: {}", e);
    }

    let mut all_accepted = true;
    for report in &reports {
        let SlotState::Done { verdict, outcome } = &report.state else {
            continue;
        };
        all_accepted &= *verdict == Verdict::Accepted;
        if json {
            println!("{}", serde_json::to_string(report)?);
            continue;
        }
        let elapsed = outcome
            .as_ref()
            .map(|o| format!(" ({} ms)", o.elapsed_ms))
            .unwrap_or_default();
        println!("#{} {:?}{}", report.slot + 1, verdict, elapsed);
    }

    Ok(if all_accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn detached(args: &[String], config: RunnerConfig) -> Result<ExitCode, CliError> {
    let [language, artifact, ..] = args else {
        return Err(CliError::Usage("detached needs a language and an artifact".to_string()));
    };
    let request = build_request(language, artifact, DEFAULT_TIME_LIMIT_MS)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let launcher = platform_launcher(&config.detached);
    let mut runner = Runner::new(0, Arc::new(config), launcher, tx);
    runner.run_detached(request);

    match rx.recv().await.map(|event| event.kind) {
        Some(RunEventKind::FailedToStart(reason)) => Err(reason.into()),
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn build_request(language: &str, artifact: &str, time_limit_ms: u64) -> Result<RunRequest, CliError> {
    let language = Language::parse(language)
        .ok_or_else(|| CliError::Usage(format!("unsupported language {:?}", language)))?;
    let run_command = std::env::var("CPRUNNER_RUN_COMMAND").unwrap_or_else(|_| match language {
        Language::Cpp => String::new(),
        Language::Java => "java".to_string(),
        Language::Python => "python3".to_string(),
    });

    Ok(RunRequest {
        slot: 0,
        executable_path: PathBuf::from(artifact),
        source_path: PathBuf::from(artifact),
        language,
        run_command,
        extra_args: std::env::var("CPRUNNER_RUN_ARGS").unwrap_or_default(),
        stdin: String::new(),
        time_limit_ms,
    })
}

/// Reads `NAME.in` files and their optional `NAME.ans` answers, sorted by name.
async fn load_cases(dir: &Path) -> Result<Vec<TestCase>, CliError> {
    let io_err = |source| CliError::Cases {
        path: dir.to_path_buf(),
        source,
    };

    let mut inputs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "in") {
            inputs.push(path);
        }
    }

    let mut cases = Vec::new();
    for input_path in inputs.into_iter().sorted() {
        let input = tokio::fs::read_to_string(&input_path).await.map_err(io_err)?;
        let expected = tokio::fs::read_to_string(input_path.with_extension("ans"))
            .await
            .ok();
        cases.push(TestCase { input, expected });
    }

    Ok(cases)
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
