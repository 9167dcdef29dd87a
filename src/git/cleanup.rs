//! Reconcile worktrees against active tickets and remove the leftovers.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::git::{ExecContext, Repository, WorktreeEntry};

/// Options for [`Repository::cleanup_orphaned`].
#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Only remove orphans whose branch is merged into this branch.
    pub require_merged_into: Option<String>,
    /// Delete the orphan's branch after removing its worktree.
    pub delete_branches: bool,
    /// Report what would be removed without touching anything.
    pub dry_run: bool,
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<WorktreeEntry>,
    /// Orphans left in place because they are locked or not merged yet.
    pub skipped: Vec<WorktreeEntry>,
}

/// Linked worktrees whose branch no longer belongs to an active ticket.
///
/// The primary worktree (always listed first), the worktree at `root`, bare
/// entries and detached worktrees are never reported.
pub fn find_orphaned(
    worktrees: &[WorktreeEntry],
    root: &Path,
    active_branches: &HashSet<String>,
) -> Vec<WorktreeEntry> {
    worktrees
        .iter()
        .skip(1)
        .filter(|w| !w.bare && !same_path(&w.path, root))
        .filter(|w| {
            w.branch
                .as_ref()
                .is_some_and(|branch| !active_branches.contains(branch))
        })
        .cloned()
        .collect()
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

impl Repository {
    /// Remove every orphaned worktree (see [`find_orphaned`]) and prune.
    #[instrument(skip_all, fields(dir = %self.path().display(), active = active_branches.len()))]
    pub async fn cleanup_orphaned(
        &self,
        ctx: &ExecContext,
        active_branches: &HashSet<String>,
        options: &CleanupOptions,
    ) -> Result<CleanupReport> {
        ctx.check("cleanup")?;
        let worktrees = self.list_worktrees(ctx).await?;
        let root = self.root_path().await?;
        let orphans = find_orphaned(&worktrees, &root, active_branches);

        let mut report = CleanupReport::default();
        for orphan in orphans {
            let Some(branch) = orphan.branch.as_deref() else {
                continue;
            };

            // `worktree remove --force` refuses locked worktrees
            if orphan.locked {
                info!(path = %orphan.path.display(), %branch, "Keeping locked orphan worktree");
                report.skipped.push(orphan);
                continue;
            }

            if let Some(target) = options.require_merged_into.as_deref() {
                if !self.is_branch_merged(ctx, branch, target).await? {
                    info!(%branch, %target, "Keeping unmerged orphan worktree");
                    report.skipped.push(orphan);
                    continue;
                }
            }

            if options.dry_run {
                info!(path = %orphan.path.display(), %branch, "Would remove orphan worktree");
                report.removed.push(orphan);
                continue;
            }

            self.remove_worktree(ctx, &orphan.path).await?;
            if options.delete_branches {
                // Worktree is already gone; a branch that refuses deletion
                // is left for the user.
                if let Err(e) = self.delete_branch(ctx, branch, true).await {
                    if e.is_cancelled() {
                        return Err(e);
                    }
                    warn!(%branch, error = %e, "Failed to delete orphan branch");
                }
            }
            report.removed.push(orphan);
        }

        if !options.dry_run {
            self.prune_worktrees(ctx).await?;
        }

        info!(
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "Orphan cleanup complete"
        );
        Ok(report)
    }
}
