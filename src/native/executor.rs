use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::RunnerConfig;
use crate::core::domain::{RunOutcome, RunRequest, StartFailure};
use crate::core::traits::executor::Executor;
use crate::core::traits::launcher::DetachedLauncher;
use crate::native::detached::platform_launcher;
use crate::native::runner::Runner;

/// Executes requests with a fresh [`Runner`] per call and returns the
/// first terminal event it reports.
#[derive(Clone, Debug)]
pub struct RunnerExecutor {
    config: Arc<RunnerConfig>,
    launcher: Arc<dyn DetachedLauncher>,
}

impl RunnerExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        let launcher = platform_launcher(&config.detached);
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: RunnerConfig, launcher: Arc<dyn DetachedLauncher>) -> Self {
        Self {
            config: Arc::new(config),
            launcher,
        }
    }
}

#[async_trait::async_trait]
impl Executor for RunnerExecutor {
    #[tracing::instrument(skip(self, request), fields(slot = request.slot))]
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, StartFailure> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut runner = Runner::new(
            request.slot,
            self.config.clone(),
            self.launcher.clone(),
            tx,
        );
        runner.run(request);

        while let Some(event) = rx.recv().await {
            if let Some(result) = event.kind.into_result() {
                return result;
            }
        }

        // Not reached while `runner` holds its sender.
        tracing::error!("Runner for slot {} stopped without a result", runner.slot());
        Err(StartFailure::Spawn {
            msg: "runner stopped without reporting a result".to_string(),
        })
    }
}
