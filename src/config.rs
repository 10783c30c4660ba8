use serde::Deserialize;

pub const DEFAULT_OUTPUT_LENGTH_LIMIT: usize = 100_000;
pub const DEFAULT_JAVA_CLASS_NAME: &str = "a";
pub const DEFAULT_TERMINAL_PROGRAM: &str = "xterm";
pub const DEFAULT_TERMINAL_ARGUMENTS: &str = "-e";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },
}

/// Runner configuration supplied by the host.
///
/// | Env Var                  | Default  |
/// |--------------------------|----------|
/// | `CPRUNNER_OUTPUT_LIMIT`  | `100000` |
/// | `CPRUNNER_JAVA_CLASS`    | `a`      |
/// | `CPRUNNER_TERMINAL`      | `xterm`  |
/// | `CPRUNNER_TERMINAL_ARGS` | `-e`     |
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum length of stdout or stderr before the process is killed.
    pub output_length_limit: usize,
    pub java_class_name: String,
    pub detached: DetachedConfig,
}

/// Terminal emulator used for detached runs on platforms without a
/// native console idiom.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DetachedConfig {
    pub terminal_program: String,
    /// Split like a command line and placed before the shell invocation.
    pub terminal_arguments: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_length_limit: DEFAULT_OUTPUT_LENGTH_LIMIT,
            java_class_name: DEFAULT_JAVA_CLASS_NAME.to_string(),
            detached: DetachedConfig::default(),
        }
    }
}

impl Default for DetachedConfig {
    fn default() -> Self {
        Self {
            terminal_program: DEFAULT_TERMINAL_PROGRAM.to_string(),
            terminal_arguments: DEFAULT_TERMINAL_ARGUMENTS.to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Overlays values from `lookup` on top of the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("CPRUNNER_OUTPUT_LIMIT") {
            config.output_length_limit =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber {
                        var: "CPRUNNER_OUTPUT_LIMIT",
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup("CPRUNNER_JAVA_CLASS") {
            config.java_class_name = value;
        }
        if let Some(value) = lookup("CPRUNNER_TERMINAL") {
            config.detached.terminal_program = value;
        }
        if let Some(value) = lookup("CPRUNNER_TERMINAL_ARGS") {
            config.detached.terminal_arguments = value;
        }

        Ok(config)
    }
}
