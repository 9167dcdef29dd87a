//! Error types for git worktree and branch operations.
//!
//! Every variant keeps its cause reachable through
//! [`std::error::Error::source`], so callers can match on the underlying
//! condition with `downcast_ref` regardless of how far the error travelled.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Cloneable handle to an underlying error.
///
/// Unlike a bare `Arc<E>`, the wrapped error itself is reported as this
/// value's source, so `downcast_ref` finds it when walking the chain.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<dyn StdError + Send + Sync>);

impl SharedError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    pub fn get(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl StdError for SharedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.get())
    }
}

/// Why an [`ExecContext`](crate::git::ExecContext) stopped an operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// How a git invocation failed once it was attempted.
#[derive(Error, Debug, Clone)]
pub enum GitFailure {
    #[error("git exited with status {0}")]
    Exit(i32),

    #[error("git was terminated by a signal")]
    Signal,

    #[error("failed to run git: {0}")]
    Spawn(#[source] SharedError),

    #[error("reference not found")]
    RefNotFound,
}

/// A branch name rejected before reaching git.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid branch name {0:?}")]
pub struct InvalidBranchName(pub String);

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Cancelled,
    Git,
    Worktree,
    Validation,
    Config,
    Ticket,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Git => "git",
            ErrorKind::Worktree => "worktree",
            ErrorKind::Validation => "validation",
            ErrorKind::Config => "config",
            ErrorKind::Ticket => "ticket",
        };
        f.write_str(name)
    }
}

/// Error returned by every operation in this crate.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("git {op}: {cause}")]
    Cancelled {
        op: String,
        #[source]
        cause: Interrupt,
    },

    #[error("git {op}{} failed: {}", branch_suffix(.branch), stderr_or_cause(.stderr, .cause))]
    Git {
        op: String,
        branch: Option<String>,
        stderr: String,
        #[source]
        cause: GitFailure,
    },

    #[error("worktree {op} failed for {}: {source}", .path.display())]
    Worktree {
        op: String,
        path: PathBuf,
        source: SharedError,
    },

    #[error("{op}: {cause}")]
    Validation {
        op: String,
        #[source]
        cause: InvalidBranchName,
    },

    #[error("configuration error: {message}: {source}")]
    Config {
        message: String,
        source: SharedError,
    },

    #[error("ticket {ticket}: {op} failed: {source}")]
    Ticket {
        op: String,
        ticket: String,
        source: SharedError,
    },
}

fn branch_suffix(branch: &Option<String>) -> String {
    branch
        .as_ref()
        .map(|b| format!(" ({b})"))
        .unwrap_or_default()
}

fn stderr_or_cause(stderr: &str, cause: &GitFailure) -> String {
    if stderr.is_empty() {
        cause.to_string()
    } else {
        stderr.to_string()
    }
}

impl Error {
    pub fn cancelled(op: impl Into<String>, cause: Interrupt) -> Self {
        Error::Cancelled {
            op: op.into(),
            cause,
        }
    }

    pub fn git(
        op: impl Into<String>,
        branch: Option<String>,
        stderr: impl Into<String>,
        cause: GitFailure,
    ) -> Self {
        Error::Git {
            op: op.into(),
            branch,
            stderr: stderr.into(),
            cause,
        }
    }

    pub fn spawn(op: impl Into<String>, source: io::Error) -> Self {
        Error::git(op, None, "", GitFailure::Spawn(SharedError::new(source)))
    }

    pub fn worktree(op: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Worktree {
            op: op.into(),
            path: path.into(),
            source: SharedError::new(source),
        }
    }

    pub fn invalid_branch(op: impl Into<String>, name: impl Into<String>) -> Self {
        Error::Validation {
            op: op.into(),
            cause: InvalidBranchName(name.into()),
        }
    }

    pub fn config<E>(message: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Config {
            message: message.into(),
            source: SharedError::new(source),
        }
    }

    pub fn ticket<E>(op: impl Into<String>, ticket: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Error::Ticket {
            op: op.into(),
            ticket: ticket.into(),
            source: SharedError::new(source),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Git { .. } => ErrorKind::Git,
            Error::Worktree { .. } => ErrorKind::Worktree,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Config { .. } => ErrorKind::Config,
            Error::Ticket { .. } => ErrorKind::Ticket,
        }
    }

    /// The operation that failed (a git subcommand or a named step).
    pub fn op(&self) -> &str {
        match self {
            Error::Cancelled { op, .. }
            | Error::Git { op, .. }
            | Error::Worktree { op, .. }
            | Error::Validation { op, .. }
            | Error::Ticket { op, .. } => op,
            Error::Config { message, .. } => message,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            Error::Git { branch, .. } => branch.as_deref(),
            Error::Validation { cause, .. } => Some(cause.0.as_str()),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Worktree { path, .. } => Some(path.as_path()),
            _ => None,
        }
    }

    /// Raw stderr captured from git, when the failure came from a git exit.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Error::Git { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }

    pub fn interrupt(&self) -> Option<Interrupt> {
        match self {
            Error::Cancelled { cause, .. } => Some(*cause),
            _ => None,
        }
    }

    /// True for both explicit cancellation and deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        self.interrupt().is_some()
    }

    pub fn is_timeout(&self) -> bool {
        self.interrupt() == Some(Interrupt::DeadlineExceeded)
    }

    /// True when git ran and exited non-zero (as opposed to failing to start).
    pub(crate) fn is_git_exit(&self) -> bool {
        matches!(
            self,
            Error::Git {
                cause: GitFailure::Exit(_),
                ..
            }
        )
    }

    /// Innermost error in the source chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
