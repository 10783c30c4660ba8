use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Opens a user-visible terminal that runs `command`.
#[mockall::automock]
pub trait DetachedLauncher: std::fmt::Debug + Send + Sync {
    fn launch_detached(&self, command: &str, working_dir: &Path) -> Result<(), LaunchError>;
}
