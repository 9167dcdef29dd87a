//! Git CLI wrapper bound to a working directory.
//!
//! Uses the git CLI directly (rather than libgit2) so that hooks,
//! sparse-checkout and the user's git configuration all apply.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::config::GitSettings;
use crate::error::{Error, GitFailure, Result};
use crate::git::ExecContext;

/// Subcommands whose last positional argument is a branch worth reporting.
const BRANCH_OPERAND_SUBCOMMANDS: [&str; 4] = ["checkout", "push", "pull", "merge"];

/// Handle to a repository (or worktree) directory.
///
/// The top-level directory is resolved lazily on first request and the
/// outcome, success or failure, is kept for the lifetime of the handle.
/// Clones share that memoised outcome.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
    timeout: Duration,
    binary: PathBuf,
    root: Arc<OnceCell<Result<PathBuf>>>,
}

impl Repository {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_timeout(path, Self::DEFAULT_TIMEOUT)
    }

    /// A zero `timeout` disables the handle-level deadline.
    pub fn with_timeout(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            binary: PathBuf::from("git"),
            root: Arc::new(OnceCell::new()),
        }
    }

    pub fn from_settings(path: impl Into<PathBuf>, settings: &GitSettings) -> Self {
        Self::with_timeout(path, settings.timeout()).with_binary(&settings.binary)
    }

    /// Use a different git executable.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// A fresh handle rooted at `path` with the same timeout and binary.
    pub fn at(&self, path: impl Into<PathBuf>) -> Self {
        Self::with_timeout(path, self.timeout).with_binary(&self.binary)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run git with `args` in this handle's directory and return trimmed stdout.
    ///
    /// If `ctx` carries no deadline, the handle timeout applies. A context
    /// that is already done fails before anything is spawned.
    #[instrument(skip_all, fields(dir = %self.path.display(), op = subcommand(args)))]
    pub async fn exec(&self, ctx: &ExecContext, args: &[&str]) -> Result<String> {
        let op = subcommand(args);
        ctx.check(op)?;

        let ctx = if ctx.deadline().is_none() && !self.timeout.is_zero() {
            ctx.with_timeout(self.timeout)
        } else {
            ctx.clone()
        };

        debug!(?args, "Running git command");

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.path)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::spawn(op, e))?;

        // Losing the race drops the child, and kill_on_drop terminates it.
        // Killing an already exited child is a no-op.
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| Error::spawn(op, e))?,
            interrupt = ctx.done() => {
                warn!(?args, %interrupt, "git command interrupted");
                return Err(Error::cancelled(op, interrupt));
            }
        };

        if !output.status.success() {
            if let Some(interrupt) = ctx.err() {
                warn!(?args, %interrupt, "git command interrupted");
                return Err(Error::cancelled(op, interrupt));
            }

            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(status = ?output.status, %stderr, "git command failed");
            return Err(Error::git(
                op,
                branch_operand(args),
                stderr,
                exit_failure(output.status),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    /// Execute a git command, discarding stdout
    pub async fn exec_silent(&self, ctx: &ExecContext, args: &[&str]) -> Result<()> {
        self.exec(ctx, args).await?;
        Ok(())
    }

    /// Top-level directory of the repository containing this handle's path.
    ///
    /// Concurrent first callers share a single `rev-parse` invocation.
    pub async fn root_path(&self) -> Result<PathBuf> {
        self.root
            .get_or_init(|| async move {
                let ctx = ExecContext::background();
                let root = self
                    .exec(&ctx, &["rev-parse", "--show-toplevel"])
                    .await
                    .map(PathBuf::from);
                match &root {
                    Ok(path) => debug!(root = %path.display(), "Resolved repository root"),
                    Err(e) => warn!(error = %e, "Failed to resolve repository root"),
                }
                root
            })
            .await
            .clone()
    }
}

fn subcommand<'a>(args: &[&'a str]) -> &'a str {
    args.first().copied().unwrap_or("git")
}

/// For checkout/push/pull/merge, the last positional argument.
fn branch_operand(args: &[&str]) -> Option<String> {
    let (first, rest) = args.split_first()?;
    if !BRANCH_OPERAND_SUBCOMMANDS.contains(first) {
        return None;
    }
    rest.iter()
        .rev()
        .find(|arg| !arg.starts_with('-'))
        .map(|arg| (*arg).to_string())
}

fn exit_failure(status: ExitStatus) -> GitFailure {
    match status.code() {
        Some(code) => GitFailure::Exit(code),
        None => GitFailure::Signal,
    }
}
