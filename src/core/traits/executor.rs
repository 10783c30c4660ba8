use crate::core::domain::{RunOutcome, RunRequest, StartFailure};

/// Runs one request to completion and reports its single terminal result.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, request: RunRequest) -> Result<RunOutcome, StartFailure>;
}
