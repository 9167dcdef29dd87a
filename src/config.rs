//! Settings for callers that construct [`Repository`](crate::git::Repository)
//! handles and initialise logging.
//!
//! The git layer never reads these itself; callers load them once and pass
//! the relevant pieces in.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Git subprocess settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Git executable (name on PATH or absolute path)
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Per-command timeout in seconds; 0 disables it (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Directory for ticket worktrees, relative to the repository root
    #[serde(default = "default_worktrees_dir")]
    pub worktrees_dir: String,
}

fn default_binary() -> String {
    "git".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_worktrees_dir() -> String {
    ".worktrees".to_string()
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            timeout_secs: default_timeout_secs(),
            worktrees_dir: default_worktrees_dir(),
        }
    }
}

impl GitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default worktree location for `branch` under `root`.
    ///
    /// Example: `feat/FEAT-12` -> `<root>/.worktrees/feat-FEAT-12`
    pub fn worktree_path(&self, root: &Path, branch: &str) -> PathBuf {
        root.join(&self.worktrees_dir).join(worktree_dir_name(branch))
    }
}

fn worktree_dir_name(branch: &str) -> String {
    let name = branch
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches(|c| c == '-' || c == '.')
        .to_string();

    if name.is_empty() {
        "worktree".to_string()
    } else {
        name
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files; logs go to stderr when unset
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl Settings {
    /// Project-level settings file, relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".tickets/config.toml")
    }

    /// Load settings from defaults, config files and the environment.
    ///
    /// Later sources win: embedded defaults, `.tickets/config.toml`, the user
    /// config (`~/.config/ticket-worktree/config.toml`), `config_path`, then
    /// `TICKET_WORKTREE__<SECTION>__<KEY>` environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let defaults_json = serde_json::to_string(&defaults)
            .map_err(|e| Error::config("failed to serialize default settings", e))?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ticket-worktree").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TICKET_WORKTREE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::config("failed to load settings", e))?;
        config
            .try_deserialize()
            .map_err(|e| Error::config("failed to deserialize settings", e))
    }
}
