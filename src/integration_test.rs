use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::config::RunnerConfig;
use crate::core::domain::{Language, OutputStream, RunRequest, TestCase, Verdict};
use crate::core::pipeline::judging::judge_all;
use crate::core::traits::launcher::MockDetachedLauncher;
use crate::native::executor::RunnerExecutor;

/// Reads one line and reacts to it the way a misbehaving solution would.
const SOLUTION: &str = r#"#!/bin/sh
read cmd
case "$cmd" in
  sum) read a b; echo $((a + b)) ;;
  spin) exec sleep 5 ;;
  flood) while true; do echo flood; done ;;
  crash) echo partial; exit 7 ;;
  *) echo "$cmd" ;;
esac
"#;

fn write_executable(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("solution");
    std::fs::write(&path, SOLUTION).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn cpp_template(executable: &Path) -> RunRequest {
    RunRequest {
        slot: 0,
        executable_path: executable.to_path_buf(),
        source_path: executable.with_extension("cpp"),
        language: Language::Cpp,
        run_command: String::new(),
        extra_args: String::new(),
        stdin: String::new(),
        time_limit_ms: 1000,
    }
}

fn executor(output_length_limit: usize) -> Arc<RunnerExecutor> {
    let config = RunnerConfig {
        output_length_limit,
        ..RunnerConfig::default()
    };
    Arc::new(RunnerExecutor::with_launcher(
        config,
        Arc::new(MockDetachedLauncher::new()),
    ))
}

fn case(input: &str, expected: &str) -> TestCase {
    TestCase {
        input: input.to_string(),
        expected: Some(expected.to_string()),
    }
}

#[tokio::test]
async fn test_judge_slots_concurrently_with_real_processes() {
    let dir = TempDir::new().unwrap();
    let executable = write_executable(&dir);
    let cases = vec![
        case("sum\n2 3\n", "5\n"),
        case("sum\n2 3\n", "6\n"),
        case("hello\n", "hello   \n\n"),
        case("spin\n", "never\n"),
        case("flood\n", "never\n"),
        case("crash\n", "partial\n"),
    ];
    let (tx, _rx) = mpsc::channel(64);

    let reports = judge_all(executor(4096), &cpp_template(&executable), &cases, &tx).await;

    let verdicts: Vec<_> = reports.iter().map(|r| r.verdict().cloned()).collect();
    assert_eq!(
        verdicts,
        vec![
            Some(Verdict::Accepted),
            Some(Verdict::WrongAnswer),
            Some(Verdict::Accepted),
            Some(Verdict::TimeLimitExceeded),
            Some(Verdict::OutputLimitExceeded(OutputStream::Stdout)),
            Some(Verdict::RuntimeError { exit_code: Some(7) }),
        ]
    );
}

#[tokio::test]
async fn test_missing_executable_reported_per_slot() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("not-compiled");
    let cases = vec![case("x\n", "x\n"), case("y\n", "y\n")];
    let (tx, _rx) = mpsc::channel(64);

    let reports = judge_all(executor(4096), &cpp_template(&missing), &cases, &tx).await;

    for report in &reports {
        assert!(matches!(
            report.verdict(),
            Some(Verdict::FailedToStart { .. })
        ));
    }
}
