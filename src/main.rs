use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ticket_worktree::config::Settings;
use ticket_worktree::git::{CleanupOptions, ExecContext, Repository, WorktreeEntry};
use ticket_worktree::logging;

#[derive(Parser)]
#[command(name = "tkw")]
#[command(about = "Git worktree and branch lifecycle for ticket workflows")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository directory (default: current directory)
    #[arg(short = 'C', long)]
    repo: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the repository top-level directory
    Root,

    /// List worktrees
    List,

    /// Create a worktree for a branch (creating the branch if needed)
    Add {
        branch: String,

        /// Worktree directory (default: <root>/<worktrees_dir>/<branch>)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Force-remove a worktree, discarding local changes
    Remove { path: PathBuf },

    /// Prune metadata for worktrees deleted outside git
    Prune,

    /// Show the worktree checked out on a branch
    Find { branch: String },

    /// Print the default branch
    DefaultBranch,

    /// Print the tip commit of a branch
    Commit { branch: String },

    /// Show commits ahead/behind a base branch
    Divergence {
        branch: String,

        /// Base branch (default: the default branch)
        #[arg(short, long)]
        base: Option<String>,
    },

    /// Check whether a branch is merged into a target
    Merged {
        branch: String,

        /// Target branch (default: the default branch)
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Remove worktrees whose branch is not an active ticket branch
    Cleanup {
        /// Branches of active tickets (repeatable)
        #[arg(short, long = "active")]
        active: Vec<String>,

        /// Only remove worktrees merged into this branch
        #[arg(long)]
        merged_into: Option<String>,

        /// Also delete the orphaned branches
        #[arg(long)]
        delete_branches: bool,

        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a git command inside a worktree
    Exec {
        worktree: PathBuf,

        #[arg(last = true, required = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let settings = Settings::load(cli.config.as_deref())?;
    let _logging_handle = logging::init_logging(&settings.logging, cli.debug)?;

    let dir = match cli.repo {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let repo = Repository::from_settings(dir, &settings.git);

    // Ctrl-C cancels whatever git command is in flight
    let ctx = ExecContext::background();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Root => {
            let root = repo.root_path().await?;
            println!("{}", root.display());
        }
        Commands::List => {
            cmd_list(&repo, &ctx).await?;
        }
        Commands::Add { branch, path } => {
            cmd_add(&repo, &ctx, &settings, &branch, path).await?;
        }
        Commands::Remove { path } => {
            repo.remove_worktree(&ctx, &path).await?;
            println!("Removed {}", path.display());
        }
        Commands::Prune => {
            repo.prune_worktrees(&ctx).await?;
        }
        Commands::Find { branch } => {
            match repo.find_worktree_by_branch(&ctx, &branch).await? {
                Some(worktree) => println!("{}", worktree.path.display()),
                None => bail!("No worktree for branch '{}'", branch),
            }
        }
        Commands::DefaultBranch => {
            println!("{}", repo.default_branch(&ctx).await?);
        }
        Commands::Commit { branch } => {
            println!("{}", repo.branch_commit(&ctx, &branch).await?);
        }
        Commands::Divergence { branch, base } => {
            let base = resolve_branch(&repo, &ctx, base).await?;
            let divergence = repo.divergence(&ctx, &branch, &base).await?;
            println!(
                "{} is {} ahead, {} behind {}",
                branch, divergence.ahead, divergence.behind, base
            );
        }
        Commands::Merged { branch, target } => {
            let target = resolve_branch(&repo, &ctx, target).await?;
            let merged = repo.is_branch_merged(&ctx, &branch, &target).await?;
            println!("{}", if merged { "merged" } else { "not merged" });
        }
        Commands::Cleanup {
            active,
            merged_into,
            delete_branches,
            dry_run,
        } => {
            let options = CleanupOptions {
                require_merged_into: merged_into,
                delete_branches,
                dry_run,
            };
            cmd_cleanup(&repo, &ctx, active, &options).await?;
        }
        Commands::Exec { worktree, args } => {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let output = repo.run_in_worktree(&ctx, &worktree, &args).await?;
            if !output.is_empty() {
                println!("{}", output);
            }
        }
    }

    Ok(())
}

async fn resolve_branch(
    repo: &Repository,
    ctx: &ExecContext,
    branch: Option<String>,
) -> Result<String> {
    match branch {
        Some(branch) => Ok(branch),
        None => repo
            .default_branch(ctx)
            .await
            .context("Failed to determine default branch"),
    }
}

fn print_worktree(worktree: &WorktreeEntry) {
    let branch = match (&worktree.branch, worktree.bare) {
        (_, true) => "(bare)".to_string(),
        (Some(branch), false) => branch.clone(),
        (None, false) => "(detached)".to_string(),
    };
    let head: String = worktree.head.chars().take(8).collect();
    println!("{:<8} {:<30} {}", head, branch, worktree.path.display());
}

async fn cmd_list(repo: &Repository, ctx: &ExecContext) -> Result<()> {
    let worktrees = repo.list_worktrees(ctx).await?;
    for worktree in &worktrees {
        print_worktree(worktree);
    }
    Ok(())
}

async fn cmd_add(
    repo: &Repository,
    ctx: &ExecContext,
    settings: &Settings,
    branch: &str,
    path: Option<PathBuf>,
) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => {
            let root = repo.root_path().await?;
            settings.git.worktree_path(&root, branch)
        }
    };

    if repo.has_worktree(ctx, branch).await? {
        bail!("Branch '{}' is already checked out in a worktree", branch);
    }

    repo.add_worktree(ctx, &path, branch)
        .await
        .with_context(|| format!("Failed to create worktree for '{}'", branch))?;
    println!("{}", display_path(&path));
    Ok(())
}

async fn cmd_cleanup(
    repo: &Repository,
    ctx: &ExecContext,
    active: Vec<String>,
    options: &CleanupOptions,
) -> Result<()> {
    let active: HashSet<String> = active.into_iter().collect();
    let report = repo.cleanup_orphaned(ctx, &active, options).await?;

    let verb = if options.dry_run { "Would remove" } else { "Removed" };
    for worktree in &report.removed {
        println!("{}: {}", verb, worktree.path.display());
    }
    for worktree in &report.skipped {
        println!("Kept (unmerged): {}", worktree.path.display());
    }
    if report.removed.is_empty() && report.skipped.is_empty() {
        println!("No orphaned worktrees");
    }
    Ok(())
}

fn display_path(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
