use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc::Sender;

use crate::core::checker::outputs_match;
use crate::core::domain::{
    OutcomeKind, RunOutcome, RunRequest, SlotReport, SlotState, StartFailure, TestCase, Verdict,
};
use crate::core::traits::executor::Executor;

/// Runs every test case in its own slot concurrently and judges the
/// results. Progress is published on `updates` as each slot changes
/// state; the final reports are returned ordered by slot.
#[tracing::instrument(skip_all, fields(cases = cases.len()))]
pub async fn judge_all(
    executor: Arc<dyn Executor>,
    template: &RunRequest,
    cases: &[TestCase],
    updates: &Sender<SlotReport>,
) -> Vec<SlotReport> {
    let mut reports: Vec<SlotReport> = (0..cases.len())
        .map(|slot| SlotReport {
            slot,
            state: SlotState::Pending,
        })
        .collect();
    for report in &reports {
        publish(updates, report.clone()).await;
    }

    let mut futures = FuturesUnordered::new();
    for (slot, case) in cases.iter().enumerate() {
        let executor = executor.clone();
        let request = template.for_slot(slot, &case.input);
        tracing::debug!("Running slot {} with input {:?}", slot, case.input);

        reports[slot].state = SlotState::Running;
        publish(updates, reports[slot].clone()).await;

        futures.push(async move { (slot, executor.execute(request).await) });
    }

    while let Some((slot, result)) = futures.next().await {
        let verdict = verdict_for(&result, cases[slot].expected.as_deref());
        tracing::info!("Slot {} judged: {:?}", slot, verdict);

        reports[slot].state = SlotState::Done {
            verdict,
            outcome: result.ok(),
        };
        publish(updates, reports[slot].clone()).await;
    }

    reports
}

async fn publish(updates: &Sender<SlotReport>, report: SlotReport) {
    if updates.send(report).await.is_err() {
        tracing::debug!("Slot updates receiver is gone");
    }
}

/// Turns the terminal result of one slot into a verdict.
pub fn verdict_for(result: &Result<RunOutcome, StartFailure>, expected: Option<&str>) -> Verdict {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(reason) => {
            return Verdict::FailedToStart {
                reason: reason.clone(),
            };
        }
    };

    match outcome.kind {
        OutcomeKind::Completed => {}
        OutcomeKind::TimedOut => return Verdict::TimeLimitExceeded,
        OutcomeKind::OutputLimitExceeded(stream) => return Verdict::OutputLimitExceeded(stream),
        OutcomeKind::KilledExternally => return Verdict::Killed,
    }

    if outcome.exit_code != Some(0) {
        return Verdict::RuntimeError {
            exit_code: outcome.exit_code,
        };
    }

    match expected {
        Some(expected) if !expected.is_empty() && !outcome.stdout.is_empty() => {
            if outputs_match(&outcome.stdout, expected) {
                Verdict::Accepted
            } else {
                Verdict::WrongAnswer
            }
        }
        _ => Verdict::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use itertools::Itertools;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::core::domain::{Language, OutputStream};
    use crate::core::traits::executor::MockExecutor;

    fn template() -> RunRequest {
        RunRequest {
            slot: 0,
            executable_path: PathBuf::from("/tmp/sol"),
            source_path: PathBuf::from("/tmp/sol.cpp"),
            language: Language::Cpp,
            run_command: String::new(),
            extra_args: String::new(),
            stdin: String::new(),
            time_limit_ms: 1000,
        }
    }

    fn outcome(slot: usize, stdout: &str, exit_code: Option<i32>, kind: OutcomeKind) -> RunOutcome {
        RunOutcome {
            slot,
            run_id: Uuid::new_v4(),
            started_at: chrono::Utc::now(),
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code,
            elapsed_ms: 10,
            kind,
        }
    }

    fn case(input: &str, expected: Option<&str>) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected: expected.map(str::to_string),
        }
    }

    /// Echoes the input back, doubling it when the input is "double".
    fn echo_executor(times: usize) -> MockExecutor {
        let mut executor = MockExecutor::new();
        executor.expect_execute().times(times).returning(|request| {
            let stdout = if request.stdin == "double\n" {
                "double double\n".to_string()
            } else {
                request.stdin.clone()
            };
            Ok(outcome(request.slot, &stdout, Some(0), OutcomeKind::Completed))
        });
        executor
    }

    #[tokio::test]
    async fn test_judge_all_verdicts() {
        let executor = Arc::new(echo_executor(4));
        let (tx, _rx) = mpsc::channel(64);
        let cases = vec![
            case("1 2 3\n", Some("1 2 3   \n\n")),
            case("double\n", Some("double\n")),
            case("x\n", None),
            case("", Some("something\n")),
        ];

        let reports = judge_all(executor, &template(), &cases, &tx).await;

        let verdicts = reports.iter().map(|r| r.verdict().cloned()).collect_vec();
        assert_eq!(
            verdicts,
            vec![
                Some(Verdict::Accepted),
                Some(Verdict::WrongAnswer),
                Some(Verdict::Unknown),
                Some(Verdict::Unknown),
            ]
        );
        assert!(reports.iter().enumerate().all(|(i, r)| r.slot == i));
    }

    #[tokio::test]
    async fn test_judge_all_publishes_progress() {
        let executor = Arc::new(echo_executor(2));
        let (tx, mut rx) = mpsc::channel(64);
        let cases = vec![case("a\n", Some("a\n")), case("b\n", Some("c\n"))];

        judge_all(executor, &template(), &cases, &tx).await;
        drop(tx);

        let mut received = Vec::new();
        while let Some(report) = rx.recv().await {
            received.push(report);
        }
        // Pending + Running + Done for each slot
        assert_eq!(received.len(), 6);

        for slot in 0..cases.len() {
            let history = received
                .iter()
                .filter(|r| r.slot == slot)
                .map(|r| &r.state)
                .collect_vec();
            assert!(matches!(history[0], SlotState::Pending));
            assert!(matches!(history[1], SlotState::Running));
            assert!(matches!(history[2], SlotState::Done { .. }));
        }
    }

    #[tokio::test]
    async fn test_requests_carry_slot_and_input() {
        let mut executor = MockExecutor::new();
        executor
            .expect_execute()
            .withf(|request| request.slot == 1 && request.stdin == "second\n")
            .times(1)
            .returning(|request| {
                Ok(outcome(request.slot, "ok\n", Some(0), OutcomeKind::Completed))
            });
        executor
            .expect_execute()
            .withf(|request| request.slot == 0 && request.stdin == "first\n")
            .times(1)
            .returning(|request| Err(StartFailure::MissingArtifact {
                path: request.executable_path.clone(),
            }));
        let (tx, _rx) = mpsc::channel(64);
        let cases = vec![case("first\n", Some("ok\n")), case("second\n", Some("ok\n"))];

        let reports = judge_all(Arc::new(executor), &template(), &cases, &tx).await;

        assert!(matches!(
            reports[0].verdict(),
            Some(Verdict::FailedToStart {
                reason: StartFailure::MissingArtifact { .. }
            })
        ));
        assert_eq!(reports[1].verdict(), Some(&Verdict::Accepted));
    }

    #[test]
    fn test_verdict_for_limits_and_kills() {
        let cases = [
            (OutcomeKind::TimedOut, Verdict::TimeLimitExceeded),
            (
                OutcomeKind::OutputLimitExceeded(OutputStream::Stderr),
                Verdict::OutputLimitExceeded(OutputStream::Stderr),
            ),
            (OutcomeKind::KilledExternally, Verdict::Killed),
        ];
        for (kind, expected) in cases {
            let result = Ok(outcome(0, "1\n", None, kind));
            assert_eq!(verdict_for(&result, Some("1\n")), expected);
        }
    }

    #[test]
    fn test_verdict_for_runtime_error() {
        let result = Ok(outcome(0, "1\n", Some(139), OutcomeKind::Completed));
        assert_eq!(
            verdict_for(&result, Some("1\n")),
            Verdict::RuntimeError {
                exit_code: Some(139)
            }
        );
    }
}
