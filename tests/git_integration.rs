//! Integration tests for the git layer against real repositories.
//!
//! Every test builds a throwaway repository inside a `TempDir` with one
//! commit on `main`, so nothing touches the checkout the tests run from.
//! Requires a `git` binary on PATH.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;
use ticket_worktree::git::{CleanupOptions, Divergence, ExecContext, Repository};
use ticket_worktree::ErrorKind;

// ─── Repository Helpers ──────────────────────────────────────────────────────

/// Run git synchronously for test setup, panicking on failure.
fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A fresh repository with one commit on `main`.
struct TestRepo {
    _temp: TempDir,
    root: PathBuf,
}

impl TestRepo {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp
            .path()
            .canonicalize()
            .expect("Failed to canonicalize temp dir");

        git(&root, &["init", "--quiet"]);
        git(&root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&root, &["config", "user.email", "tests@example.com"]);
        git(&root, &["config", "user.name", "Ticket Tests"]);
        git(&root, &["config", "commit.gpgsign", "false"]);

        let repo = Self { _temp: temp, root };
        repo.commit_file("README.md", "# tickets\n", "Initial commit");
        repo
    }

    fn handle(&self) -> Repository {
        Repository::new(&self.root)
    }

    fn commit_file(&self, name: &str, contents: &str, message: &str) {
        self.commit_in(&self.root, name, contents, message);
    }

    fn commit_in(&self, dir: &Path, name: &str, contents: &str, message: &str) {
        std::fs::write(dir.join(name), contents).expect("Failed to write file");
        git(dir, &["add", name]);
        git(dir, &["commit", "--quiet", "-m", message]);
    }

    fn worktree_path(&self, name: &str) -> PathBuf {
        self.root.join(".worktrees").join(name)
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().expect("Failed to canonicalize path")
}

fn ctx() -> ExecContext {
    ExecContext::background()
}

// ─── Worktree Registry ───────────────────────────────────────────────────────

mod worktree_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_worktree_creates_branch_and_worktree() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let path = repo.worktree_path("feature");

        handle
            .add_worktree(&ctx(), &path, "feature")
            .await
            .expect("Should add worktree");

        assert!(path.exists());
        assert!(handle.branch_exists(&ctx(), "feature").await.unwrap());

        let worktrees = handle.list_worktrees(&ctx()).await.unwrap();
        assert_eq!(worktrees.len(), 2);

        let found = handle
            .find_worktree_by_branch(&ctx(), "feature")
            .await
            .unwrap()
            .expect("Worktree for feature should exist");
        assert_eq!(canonical(&found.path), canonical(&path));
        assert_eq!(found.branch.as_deref(), Some("feature"));
        assert_eq!(found.head.len(), 40);
    }

    #[tokio::test]
    async fn test_remove_worktree_deletes_directory() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let path = repo.worktree_path("feature");
        handle.add_worktree(&ctx(), &path, "feature").await.unwrap();

        // Uncommitted and untracked work does not block removal
        std::fs::write(path.join("scratch.txt"), "wip").unwrap();
        std::fs::write(path.join("README.md"), "edited").unwrap();

        handle
            .remove_worktree(&ctx(), &path)
            .await
            .expect("Should remove worktree");

        let worktrees = handle.list_worktrees(&ctx()).await.unwrap();
        assert_eq!(worktrees.len(), 1);
        assert!(!path.exists());
        assert!(!handle.has_worktree(&ctx(), "feature").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_worktree_attaches_existing_branch() {
        let repo = TestRepo::new();
        git(&repo.root, &["branch", "existing"]);
        let handle = repo.handle();
        let path = repo.worktree_path("existing");

        handle
            .add_worktree(&ctx(), &path, "existing")
            .await
            .expect("Should attach existing branch");

        assert!(handle.has_worktree(&ctx(), "existing").await.unwrap());
        assert_eq!(git(&path, &["rev-parse", "--abbrev-ref", "HEAD"]), "existing");
    }

    #[tokio::test]
    async fn test_add_worktree_with_nested_branch_name() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let path = repo.root.join("trees").join("deep").join("feat-12");

        handle
            .add_worktree(&ctx(), &path, "feat/FEAT-12")
            .await
            .unwrap();

        let found = handle
            .find_worktree_by_branch(&ctx(), "feat/FEAT-12")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_find_worktree_absent_is_none() {
        let repo = TestRepo::new();
        let handle = repo.handle();

        let found = handle
            .find_worktree_by_branch(&ctx(), "no-such-branch")
            .await
            .expect("Absence is not an error");
        assert!(found.is_none());
        assert!(!handle.has_worktree(&ctx(), "no-such-branch").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_worktrees_is_idempotent() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        handle
            .add_worktree(&ctx(), &repo.worktree_path("a"), "a")
            .await
            .unwrap();

        let first = handle.list_worktrees(&ctx()).await.unwrap();
        let second = handle.list_worktrees(&ctx()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(canonical(&first[0].path), repo.root);
        assert_eq!(first[0].branch.as_deref(), Some("main"));
    }

    #[tokio::test]
    async fn test_prune_after_external_delete() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let path = repo.worktree_path("gone");
        handle.add_worktree(&ctx(), &path, "gone").await.unwrap();

        std::fs::remove_dir_all(&path).unwrap();
        assert_eq!(handle.list_worktrees(&ctx()).await.unwrap().len(), 2);

        handle.prune_worktrees(&ctx()).await.expect("Should prune");
        assert_eq!(handle.list_worktrees(&ctx()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_in_worktree_uses_worktree_checkout() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let path = repo.worktree_path("feature");
        handle.add_worktree(&ctx(), &path, "feature").await.unwrap();

        let branch = handle
            .run_in_worktree(&ctx(), &path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .unwrap();
        assert_eq!(branch, "feature");

        let primary = handle
            .exec(&ctx(), &["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .unwrap();
        assert_eq!(primary, "main");
    }

    #[tokio::test]
    async fn test_add_worktree_twice_for_same_branch_fails() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        handle
            .add_worktree(&ctx(), &repo.worktree_path("one"), "feature")
            .await
            .unwrap();

        let err = handle
            .add_worktree(&ctx(), &repo.worktree_path("two"), "feature")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Git);
        assert_eq!(err.op(), "worktree");
        assert!(!err.stderr().unwrap_or_default().is_empty());
    }
}

// ─── Branch Relationships ────────────────────────────────────────────────────

mod branch_tests {
    use super::*;

    #[tokio::test]
    async fn test_divergence_tracks_commits_on_both_sides() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["branch", "feature"]);

        let even = handle.divergence(&ctx(), "feature", "main").await.unwrap();
        assert_eq!(even, Divergence::default());

        let path = repo.worktree_path("feature");
        handle.add_worktree(&ctx(), &path, "feature").await.unwrap();
        repo.commit_in(&path, "feature.txt", "feature", "Feature work");

        let ahead = handle.divergence(&ctx(), "feature", "main").await.unwrap();
        assert_eq!(ahead, Divergence { ahead: 1, behind: 0 });

        repo.commit_file("main.txt", "main", "Main work");

        let both = handle.divergence(&ctx(), "feature", "main").await.unwrap();
        assert_eq!(both, Divergence { ahead: 1, behind: 1 });
    }

    #[tokio::test]
    async fn test_divergence_of_branch_with_itself_is_zero() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["branch", "feat/self"]);

        for branch in ["main", "feat/self"] {
            let divergence = handle.divergence(&ctx(), branch, branch).await.unwrap();
            assert!(divergence.is_even(), "{branch} diverged from itself");
        }
    }

    #[tokio::test]
    async fn test_branch_commit_and_diverged_from() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["branch", "feature"]);

        let main = handle.branch_commit(&ctx(), "main").await.unwrap();
        assert_eq!(main, git(&repo.root, &["rev-parse", "HEAD"]));
        assert_eq!(main.len(), 40);

        assert!(!handle
            .branch_diverged_from(&ctx(), "feature", "main")
            .await
            .unwrap());

        repo.commit_file("more.txt", "more", "More on main");
        assert!(handle
            .branch_diverged_from(&ctx(), "feature", "main")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_branch_commit_missing_branch_is_git_error() {
        let repo = TestRepo::new();
        let err = repo
            .handle()
            .branch_commit(&ctx(), "missing")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Git);
    }

    #[tokio::test]
    async fn test_nonexistent_branch_is_not_merged() {
        let repo = TestRepo::new();
        let handle = repo.handle();

        let merged = handle
            .is_branch_merged(&ctx(), "nonexistent-branch", "main")
            .await
            .expect("Missing branch is not an error");
        assert!(!merged);

        let merged = handle
            .is_branch_merged(&ctx(), "main", "nonexistent-target")
            .await
            .unwrap();
        assert!(!merged);
    }

    #[tokio::test]
    async fn test_is_branch_merged() {
        let repo = TestRepo::new();
        let handle = repo.handle();

        assert!(handle.is_branch_merged(&ctx(), "main", "main").await.unwrap());

        let path = repo.worktree_path("feature");
        handle.add_worktree(&ctx(), &path, "feature").await.unwrap();
        repo.commit_in(&path, "feature.txt", "feature", "Feature work");
        assert!(!handle
            .is_branch_merged(&ctx(), "feature", "main")
            .await
            .unwrap());

        git(&repo.root, &["merge", "--quiet", "--ff-only", "feature"]);
        assert!(handle
            .is_branch_merged(&ctx(), "feature", "main")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_branch_queries_ignore_tag_with_same_name() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["tag", "feature"]);

        let path = repo.worktree_path("feature");
        handle.add_worktree(&ctx(), &path, "feature").await.unwrap();
        repo.commit_in(&path, "work.txt", "work", "Feature work");

        let tip = git(&path, &["rev-parse", "HEAD"]);
        assert_eq!(handle.branch_commit(&ctx(), "feature").await.unwrap(), tip);
        assert_eq!(
            handle.divergence(&ctx(), "feature", "main").await.unwrap(),
            Divergence { ahead: 1, behind: 0 }
        );
        assert!(!handle
            .is_branch_merged(&ctx(), "feature", "main")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_add_worktree_rejects_leading_dash() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let path = repo.worktree_path("dash");

        let err = handle.add_worktree(&ctx(), &path, "-dash").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!path.exists());
        assert_eq!(handle.list_worktrees(&ctx()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_default_branch_falls_back_to_main_then_master() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        assert_eq!(handle.default_branch(&ctx()).await.unwrap(), "main");

        git(&repo.root, &["branch", "-m", "main", "master"]);
        assert_eq!(handle.default_branch(&ctx()).await.unwrap(), "master");

        git(&repo.root, &["branch", "-m", "master", "trunk"]);
        let err = handle.default_branch(&ctx()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Git);
    }

    #[tokio::test]
    async fn test_default_branch_prefers_origin_head() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["branch", "develop"]);
        git(
            &repo.root,
            &["update-ref", "refs/remotes/origin/develop", "refs/heads/develop"],
        );
        git(
            &repo.root,
            &[
                "symbolic-ref",
                "refs/remotes/origin/HEAD",
                "refs/remotes/origin/develop",
            ],
        );

        assert_eq!(handle.default_branch(&ctx()).await.unwrap(), "develop");
    }

    #[tokio::test]
    async fn test_delete_branch() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["branch", "to-delete"]);

        handle.delete_branch(&ctx(), "to-delete", false).await.unwrap();
        assert!(!handle.branch_exists(&ctx(), "to-delete").await.unwrap());
    }
}

// ─── Root Resolution & Cancellation ──────────────────────────────────────────

mod root_and_cancel_tests {
    use super::*;

    #[tokio::test]
    async fn test_root_path_from_subdirectory_and_worktree() {
        let repo = TestRepo::new();
        let sub = repo.root.join("docs");
        std::fs::create_dir_all(&sub).unwrap();

        let root = Repository::new(&sub).root_path().await.unwrap();
        assert_eq!(canonical(&root), repo.root);

        let path = repo.worktree_path("feature");
        repo.handle()
            .add_worktree(&ctx(), &path, "feature")
            .await
            .unwrap();
        let wt_root = repo.handle().at(&path).root_path().await.unwrap();
        assert_eq!(canonical(&wt_root), canonical(&path));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_root_path_concurrent_callers_agree() {
        let repo = TestRepo::new();
        let handle = Arc::new(repo.handle());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let handle = Arc::clone(&handle);
            tasks.push(tokio::spawn(async move { handle.root_path().await }));
        }
        for task in tasks {
            let root = task.await.unwrap().unwrap();
            assert_eq!(canonical(&root), repo.root);
        }
    }

    #[tokio::test]
    async fn test_root_path_outside_repository_fails() {
        let temp = TempDir::new().unwrap();
        let err = Repository::new(temp.path()).root_path().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Git);
        assert_eq!(err.op(), "rev-parse");
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits_every_operation() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        let cancelled = ExecContext::background();
        cancelled.cancel();
        let path = repo.worktree_path("never");

        let errors = vec![
            handle.list_worktrees(&cancelled).await.unwrap_err(),
            handle.add_worktree(&cancelled, &path, "never").await.unwrap_err(),
            handle.remove_worktree(&cancelled, &path).await.unwrap_err(),
            handle.prune_worktrees(&cancelled).await.unwrap_err(),
            handle
                .find_worktree_by_branch(&cancelled, "main")
                .await
                .unwrap_err(),
            handle.has_worktree(&cancelled, "main").await.unwrap_err(),
            handle
                .run_in_worktree(&cancelled, &repo.root, &["status"])
                .await
                .unwrap_err(),
            handle.default_branch(&cancelled).await.unwrap_err(),
            handle.branch_commit(&cancelled, "main").await.unwrap_err(),
            handle
                .branch_diverged_from(&cancelled, "main", "main")
                .await
                .unwrap_err(),
            handle
                .divergence(&cancelled, "main", "main")
                .await
                .unwrap_err(),
            handle
                .is_branch_merged(&cancelled, "main", "main")
                .await
                .unwrap_err(),
            handle.branch_exists(&cancelled, "main").await.unwrap_err(),
            handle
                .delete_branch(&cancelled, "main", true)
                .await
                .unwrap_err(),
            repo.handle()
                .cleanup_orphaned(&cancelled, &HashSet::new(), &CleanupOptions::default())
                .await
                .unwrap_err(),
        ];

        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Cancelled, "unexpected: {err}");
        }
        assert!(!path.exists());
        assert!(!repo.root.join(".worktrees").exists());
    }
}

// ─── Orphan Cleanup ──────────────────────────────────────────────────────────

mod cleanup_tests {
    use super::*;

    fn active(branches: &[&str]) -> HashSet<String> {
        branches.iter().map(|b| (*b).to_string()).collect()
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_inactive_worktrees() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        for name in ["keep", "drop"] {
            handle
                .add_worktree(&ctx(), &repo.worktree_path(name), name)
                .await
                .unwrap();
        }

        let report = handle
            .cleanup_orphaned(&ctx(), &active(&["keep"]), &CleanupOptions::default())
            .await
            .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].branch.as_deref(), Some("drop"));
        assert!(repo.worktree_path("keep").exists());
        assert!(!repo.worktree_path("drop").exists());
        assert!(handle.branch_exists(&ctx(), "drop").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_dry_run_leaves_everything() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        handle
            .add_worktree(&ctx(), &repo.worktree_path("stale"), "stale")
            .await
            .unwrap();

        let options = CleanupOptions {
            dry_run: true,
            ..CleanupOptions::default()
        };
        let report = handle
            .cleanup_orphaned(&ctx(), &HashSet::new(), &options)
            .await
            .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert!(repo.worktree_path("stale").exists());
        assert_eq!(handle.list_worktrees(&ctx()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_requires_merge_and_deletes_branches() {
        let repo = TestRepo::new();
        let handle = repo.handle();

        let merged = repo.worktree_path("merged");
        handle.add_worktree(&ctx(), &merged, "merged").await.unwrap();

        let unmerged = repo.worktree_path("unmerged");
        handle
            .add_worktree(&ctx(), &unmerged, "unmerged")
            .await
            .unwrap();
        repo.commit_in(&unmerged, "wip.txt", "wip", "Unmerged work");

        let options = CleanupOptions {
            require_merged_into: Some("main".to_string()),
            delete_branches: true,
            dry_run: false,
        };
        let report = handle
            .cleanup_orphaned(&ctx(), &HashSet::new(), &options)
            .await
            .unwrap();

        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].branch.as_deref(), Some("merged"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].branch.as_deref(), Some("unmerged"));

        assert!(!merged.exists());
        assert!(unmerged.exists());
        assert!(!handle.branch_exists(&ctx(), "merged").await.unwrap());
        assert!(handle.branch_exists(&ctx(), "unmerged").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_unmerged_branch_behind_same_named_tag() {
        let repo = TestRepo::new();
        let handle = repo.handle();
        git(&repo.root, &["tag", "feature"]);

        let path = repo.worktree_path("feature");
        handle.add_worktree(&ctx(), &path, "feature").await.unwrap();
        repo.commit_in(&path, "wip.txt", "wip", "Unmerged work");

        let options = CleanupOptions {
            require_merged_into: Some("main".to_string()),
            delete_branches: true,
            dry_run: false,
        };
        let report = handle
            .cleanup_orphaned(&ctx(), &HashSet::new(), &options)
            .await
            .unwrap();

        assert!(report.removed.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert!(path.exists());
        assert!(handle.branch_exists(&ctx(), "feature").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_skips_locked_worktree_and_still_prunes() {
        let repo = TestRepo::new();
        let handle = repo.handle();

        let locked = repo.worktree_path("locked");
        handle.add_worktree(&ctx(), &locked, "locked").await.unwrap();
        git(&repo.root, &["worktree", "lock", locked.to_str().unwrap()]);

        let vanished = repo.worktree_path("vanished");
        handle
            .add_worktree(&ctx(), &vanished, "vanished")
            .await
            .unwrap();
        std::fs::remove_dir_all(&vanished).unwrap();

        let stale = repo.worktree_path("stale");
        handle.add_worktree(&ctx(), &stale, "stale").await.unwrap();

        let active = active(&["vanished"]);
        let report = handle
            .cleanup_orphaned(&ctx(), &active, &CleanupOptions::default())
            .await
            .unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].branch.as_deref(), Some("locked"));
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].branch.as_deref(), Some("stale"));
        assert!(locked.exists());
        assert!(!stale.exists());

        let mut branches: Vec<_> = handle
            .list_worktrees(&ctx())
            .await
            .unwrap()
            .into_iter()
            .filter_map(|w| w.branch)
            .collect();
        branches.sort();
        assert_eq!(branches, vec!["locked", "main"]);
    }
}
