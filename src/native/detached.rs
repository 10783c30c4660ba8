use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::DetachedConfig;
use crate::core::command::split_command;
use crate::core::traits::launcher::{DetachedLauncher, LaunchError};

/// A helper process that opens the terminal window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetachedInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the helper's stdin, which is then closed.
    pub script: Option<String>,
}

impl DetachedInvocation {
    /// Spawns the helper and reaps it in the background; the caller does
    /// not wait for the terminal to close.
    fn spawn(self, working_dir: &Path) -> Result<(), LaunchError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(working_dir)
            .stdin(if self.script.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        tracing::info!("Detached helper started: {} {:?}", self.program, self.args);

        let stdin = child.stdin.take();
        let script = self.script;
        tokio::spawn(async move {
            if let (Some(mut stdin), Some(script)) = (stdin, script) {
                if let Err(e) = stdin.write_all(script.as_bytes()).await {
                    tracing::warn!("Failed to pass script to detached helper: {}", e);
                }
            }
            match child.wait().await {
                Ok(status) => tracing::debug!("Detached helper exited: {}", status),
                Err(e) => tracing::warn!("Failed to wait for detached helper: {}", e),
            }
        });

        Ok(())
    }
}

/// Drives Terminal.app through AppleScript.
#[derive(Clone, Debug, Default)]
pub struct AppleScriptLauncher;

impl AppleScriptLauncher {
    pub fn invocation(&self, command: &str, working_dir: &Path) -> DetachedInvocation {
        let command = format!("cd '{}' && {}", working_dir.display(), command).replace('"', "'");
        DetachedInvocation {
            program: "osascript".to_string(),
            args: vec!["-l".to_string(), "AppleScript".to_string()],
            script: Some(format!(
                "tell app \"Terminal\" to do script \"{}\"",
                command
            )),
        }
    }
}

impl DetachedLauncher for AppleScriptLauncher {
    fn launch_detached(&self, command: &str, working_dir: &Path) -> Result<(), LaunchError> {
        self.invocation(command, working_dir).spawn(working_dir)
    }
}

/// Opens a new console window with `cmd` and pauses before closing it.
#[derive(Clone, Debug, Default)]
pub struct ConsoleLauncher;

impl ConsoleLauncher {
    pub fn invocation(&self, command: &str) -> DetachedInvocation {
        DetachedInvocation {
            program: "cmd".to_string(),
            args: vec![
                "/C".to_string(),
                format!("start cmd /C {} ^& pause", command.replace('"', "^\"")),
            ],
            script: None,
        }
    }
}

impl DetachedLauncher for ConsoleLauncher {
    fn launch_detached(&self, command: &str, working_dir: &Path) -> Result<(), LaunchError> {
        self.invocation(command).spawn(working_dir)
    }
}

/// Runs the command through bash inside a configured terminal emulator.
#[derive(Clone, Debug)]
pub struct TerminalEmulatorLauncher {
    config: DetachedConfig,
}

impl TerminalEmulatorLauncher {
    pub fn new(config: DetachedConfig) -> Self {
        Self { config }
    }

    pub fn invocation(&self, command: &str) -> DetachedInvocation {
        let mut args = split_command(&self.config.terminal_arguments);
        args.extend([
            "/bin/bash".to_string(),
            "-c".to_string(),
            format!(
                "{} ; echo \"\nProgram finished with exit code $?\nPress any key to exit\" ; read -n 1",
                command
            ),
        ]);
        DetachedInvocation {
            program: self.config.terminal_program.clone(),
            args,
            script: None,
        }
    }
}

impl DetachedLauncher for TerminalEmulatorLauncher {
    fn launch_detached(&self, command: &str, working_dir: &Path) -> Result<(), LaunchError> {
        self.invocation(command).spawn(working_dir)
    }
}

/// Picks the launch strategy for the host platform.
pub fn platform_launcher(config: &DetachedConfig) -> Arc<dyn DetachedLauncher> {
    if cfg!(target_os = "macos") {
        Arc::new(AppleScriptLauncher)
    } else if cfg!(windows) {
        Arc::new(ConsoleLauncher)
    } else {
        Arc::new(TerminalEmulatorLauncher::new(config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apple_script_invocation() {
        let invocation =
            AppleScriptLauncher.invocation("python3 \"/tmp/a.py\"", Path::new("/tmp"));
        assert_eq!(invocation.program, "osascript");
        assert_eq!(invocation.args, vec!["-l", "AppleScript"]);
        assert_eq!(
            invocation.script.as_deref(),
            Some("tell app \"Terminal\" to do script \"cd '/tmp' && python3 '/tmp/a.py'\"")
        );
    }

    #[test]
    fn test_console_invocation() {
        let invocation = ConsoleLauncher.invocation("\"C:\\work\\a.exe\" 1");
        assert_eq!(invocation.program, "cmd");
        assert_eq!(
            invocation.args,
            vec!["/C", "start cmd /C ^\"C:\\work\\a.exe^\" 1 ^& pause"]
        );
        assert!(invocation.script.is_none());
    }

    #[test]
    fn test_terminal_emulator_invocation() {
        let launcher = TerminalEmulatorLauncher::new(DetachedConfig {
            terminal_program: "gnome-terminal".to_string(),
            terminal_arguments: "--wait --".to_string(),
        });
        let invocation = launcher.invocation("\"/tmp/a.out\"");

        assert_eq!(invocation.program, "gnome-terminal");
        assert_eq!(&invocation.args[..4], ["--wait", "--", "/bin/bash", "-c"]);
        assert!(invocation.args[4].starts_with("\"/tmp/a.out\" ; echo"));
        assert!(invocation.args[4].ends_with("; read -n 1"));
    }

    #[tokio::test]
    async fn test_missing_terminal_program_fails() {
        let launcher = TerminalEmulatorLauncher::new(DetachedConfig {
            terminal_program: "/nonexistent/terminal".to_string(),
            terminal_arguments: String::new(),
        });
        let result = launcher.launch_detached("true", &std::env::temp_dir());
        assert!(matches!(result, Err(LaunchError::Spawn { .. })));
    }
}
