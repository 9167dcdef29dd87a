//! Git worktree registry operations for per-ticket development.
//!
//! Each ticket in progress gets its own linked worktree and branch, so
//! several tickets can be worked on side by side without stashing.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::git::branch_name::ensure_valid;
use crate::git::{ExecContext, Repository};

/// One entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    /// Short branch name; `None` for a detached HEAD or a bare entry.
    pub branch: Option<String>,
    /// HEAD commit; empty for a bare entry.
    pub head: String,
    pub bare: bool,
    pub locked: bool,
    pub prunable: bool,
}

impl WorktreeEntry {
    fn new(path: &str) -> Self {
        Self {
            path: PathBuf::from(path),
            branch: None,
            head: String::new(),
            bare: false,
            locked: false,
            prunable: false,
        }
    }

    pub fn is_detached(&self) -> bool {
        !self.bare && self.branch.is_none()
    }
}

/// Parse porcelain output into entries.
///
/// Records are separated by blank lines. Lines this parser does not know
/// are ignored, as are records that never name a worktree path.
pub fn parse_porcelain(output: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if line.trim().is_empty() {
            entries.extend(current.take());
            continue;
        }

        if let Some(path) = line.strip_prefix("worktree ") {
            entries.extend(current.take());
            current = Some(WorktreeEntry::new(path));
            continue;
        }

        let Some(entry) = current.as_mut() else {
            continue;
        };

        if let Some(head) = line.strip_prefix("HEAD ") {
            entry.head = head.to_string();
        } else if let Some(branch) = line.strip_prefix("branch ") {
            let short = branch.strip_prefix("refs/heads/").unwrap_or(branch);
            entry.branch = Some(short.to_string());
        } else if line == "bare" {
            entry.bare = true;
        } else if line == "locked" || line.starts_with("locked ") {
            entry.locked = true;
        } else if line == "prunable" || line.starts_with("prunable ") {
            entry.prunable = true;
        }
    }

    entries.extend(current);
    entries
}

impl Repository {
    /// List all worktrees known to the repository, primary first.
    #[instrument(skip_all, fields(dir = %self.path().display()))]
    pub async fn list_worktrees(&self, ctx: &ExecContext) -> Result<Vec<WorktreeEntry>> {
        let output = self.exec(ctx, &["worktree", "list", "--porcelain"]).await?;
        let entries = parse_porcelain(&output);
        debug!(count = entries.len(), "Listed worktrees");
        Ok(entries)
    }

    /// Create a worktree at `path` checked out on `branch`.
    ///
    /// An existing branch is attached as-is; otherwise the branch is created
    /// from the current HEAD together with the worktree.
    #[instrument(skip(self, ctx), fields(dir = %self.path().display(), path = %path.display()))]
    pub async fn add_worktree(&self, ctx: &ExecContext, path: &Path, branch: &str) -> Result<()> {
        ensure_valid("worktree add", branch)?;
        ctx.check("worktree add")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::worktree("add", parent, e))?;
        }

        let path_str = path.to_string_lossy();
        if self.branch_exists(ctx, branch).await? {
            debug!("Branch exists, attaching worktree");
            self.exec_silent(
                ctx,
                &["worktree", "add", "--end-of-options", &path_str, branch],
            )
            .await?;
        } else {
            debug!("Creating branch with worktree");
            self.exec_silent(
                ctx,
                &["worktree", "add", "-b", branch, "--end-of-options", &path_str],
            )
            .await?;
        }

        info!("Worktree created");
        Ok(())
    }

    /// Force-remove the worktree at `path`.
    ///
    /// Uncommitted and untracked changes in the worktree are discarded.
    #[instrument(skip(self, ctx), fields(dir = %self.path().display(), path = %path.display()))]
    pub async fn remove_worktree(&self, ctx: &ExecContext, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.exec_silent(
            ctx,
            &["worktree", "remove", "--force", "--end-of-options", &path_str],
        )
        .await?;
        info!("Worktree removed");
        Ok(())
    }

    /// Drop metadata for worktrees whose directories no longer exist.
    #[instrument(skip_all, fields(dir = %self.path().display()))]
    pub async fn prune_worktrees(&self, ctx: &ExecContext) -> Result<()> {
        self.exec_silent(ctx, &["worktree", "prune"]).await
    }

    /// The worktree checked out on `branch`, if any.
    pub async fn find_worktree_by_branch(
        &self,
        ctx: &ExecContext,
        branch: &str,
    ) -> Result<Option<WorktreeEntry>> {
        let worktrees = self.list_worktrees(ctx).await?;
        Ok(worktrees
            .into_iter()
            .find(|w| w.branch.as_deref() == Some(branch)))
    }

    pub async fn has_worktree(&self, ctx: &ExecContext, branch: &str) -> Result<bool> {
        Ok(self.find_worktree_by_branch(ctx, branch).await?.is_some())
    }

    /// Run git inside `worktree_path` rather than this handle's directory.
    pub async fn run_in_worktree(
        &self,
        ctx: &ExecContext,
        worktree_path: &Path,
        args: &[&str],
    ) -> Result<String> {
        self.at(worktree_path).exec(ctx, args).await
    }
}
