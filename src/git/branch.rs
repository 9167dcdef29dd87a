//! Branch lookups and branch-to-branch relationships.

use tracing::{debug, instrument, warn};

use crate::error::{Error, GitFailure, Result};
use crate::git::branch_name::ensure_valid;
use crate::git::{ExecContext, Repository};

/// Local branches tried, in order, when `origin/HEAD` is not set.
const FALLBACK_DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

/// Commit counts between two branch tips.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Divergence {
    /// Commits on the branch that the base lacks.
    pub ahead: u64,
    /// Commits on the base that the branch lacks.
    pub behind: u64,
}

impl Divergence {
    pub fn is_even(&self) -> bool {
        self.ahead == 0 && self.behind == 0
    }
}

/// Parse `rev-list --count` output; anything unparsable counts as zero.
pub(crate) fn parse_count(output: &str) -> u64 {
    match output.trim().parse() {
        Ok(count) => count,
        Err(_) => {
            warn!(output, "Unparsable rev-list count, treating as 0");
            0
        }
    }
}

/// Fully qualified ref for a local branch.
fn local_ref(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

impl Repository {
    /// Whether a local branch named `branch` exists.
    pub async fn branch_exists(&self, ctx: &ExecContext, branch: &str) -> Result<bool> {
        ensure_valid("rev-parse", branch)?;
        let refname = local_ref(branch);
        match self
            .exec(ctx, &["rev-parse", "--verify", "--quiet", &refname])
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_git_exit() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Name of the repository's default branch.
    ///
    /// Prefers `origin/HEAD`, then local `main`, then local `master`.
    #[instrument(skip_all, fields(dir = %self.path().display()))]
    pub async fn default_branch(&self, ctx: &ExecContext) -> Result<String> {
        match self
            .exec(
                ctx,
                &["symbolic-ref", "--quiet", "--short", "refs/remotes/origin/HEAD"],
            )
            .await
        {
            Ok(short) => {
                let branch = short.strip_prefix("origin/").unwrap_or(&short);
                debug!(%branch, "Default branch from origin/HEAD");
                return Ok(branch.to_string());
            }
            Err(e) if e.is_git_exit() => {}
            Err(e) => return Err(e),
        }

        for candidate in FALLBACK_DEFAULT_BRANCHES {
            if self.branch_exists(ctx, candidate).await? {
                debug!(branch = candidate, "Default branch from local fallback");
                return Ok(candidate.to_string());
            }
        }

        Err(Error::git(
            "default-branch",
            None,
            "no origin/HEAD, main, or master branch found",
            GitFailure::RefNotFound,
        ))
    }

    /// Full commit SHA at the tip of the local branch `branch`.
    ///
    /// Only `refs/heads/` is consulted, so a tag sharing the name is ignored.
    pub async fn branch_commit(&self, ctx: &ExecContext, branch: &str) -> Result<String> {
        ensure_valid("rev-parse", branch)?;
        let commit = format!("{}^{{commit}}", local_ref(branch));
        self.exec(ctx, &["rev-parse", "--verify", "--end-of-options", &commit])
            .await
    }

    /// Whether the tips of `branch` and `base` point at different commits.
    pub async fn branch_diverged_from(
        &self,
        ctx: &ExecContext,
        branch: &str,
        base: &str,
    ) -> Result<bool> {
        let branch_commit = self.branch_commit(ctx, branch).await?;
        let base_commit = self.branch_commit(ctx, base).await?;
        Ok(branch_commit != base_commit)
    }

    /// Commits `branch` is ahead of and behind `base`.
    #[instrument(skip(self, ctx), fields(dir = %self.path().display()))]
    pub async fn divergence(
        &self,
        ctx: &ExecContext,
        branch: &str,
        base: &str,
    ) -> Result<Divergence> {
        ensure_valid("rev-list", branch)?;
        ensure_valid("rev-list", base)?;

        let (branch_ref, base_ref) = (local_ref(branch), local_ref(base));

        let ahead_range = format!("{base_ref}..{branch_ref}");
        let ahead = self
            .exec(ctx, &["rev-list", "--count", "--end-of-options", &ahead_range])
            .await?;

        let behind_range = format!("{branch_ref}..{base_ref}");
        let behind = self
            .exec(ctx, &["rev-list", "--count", "--end-of-options", &behind_range])
            .await?;

        Ok(Divergence {
            ahead: parse_count(&ahead),
            behind: parse_count(&behind),
        })
    }

    /// Whether every commit on `branch` is reachable from `target`.
    ///
    /// A missing `branch` or `target` reports `false` rather than an error.
    #[instrument(skip(self, ctx), fields(dir = %self.path().display()))]
    pub async fn is_branch_merged(
        &self,
        ctx: &ExecContext,
        branch: &str,
        target: &str,
    ) -> Result<bool> {
        let Some(branch_commit) = self.existing_commit(ctx, branch).await? else {
            return Ok(false);
        };
        let Some(target_commit) = self.existing_commit(ctx, target).await? else {
            return Ok(false);
        };

        if branch_commit == target_commit {
            return Ok(true);
        }

        match self
            .exec(
                ctx,
                &["merge-base", "--is-ancestor", &branch_commit, &target_commit],
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(Error::Git {
                cause: GitFailure::Exit(1),
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a local branch; `force` also deletes unmerged work.
    #[instrument(skip(self, ctx), fields(dir = %self.path().display()))]
    pub async fn delete_branch(&self, ctx: &ExecContext, branch: &str, force: bool) -> Result<()> {
        ensure_valid("branch", branch)?;
        let flag = if force { "-D" } else { "-d" };
        self.exec_silent(ctx, &["branch", flag, "--end-of-options", branch])
            .await
    }

    /// Tip commit of `branch`, or `None` when git cannot resolve it.
    async fn existing_commit(&self, ctx: &ExecContext, branch: &str) -> Result<Option<String>> {
        match self.branch_commit(ctx, branch).await {
            Ok(commit) => Ok(Some(commit)),
            Err(e) if e.is_git_exit() => {
                debug!(%branch, "Branch does not resolve");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
