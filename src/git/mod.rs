//! Git operations module - worktree management and CLI wrapper.
//!
//! Every operation shells out to the git binary through
//! [`Repository::exec`]:
//! - Isolated worktree + branch per ticket for parallel development
//! - Branch divergence and merge checks for close/cleanup decisions
//! - Cancellation and timeouts via [`ExecContext`]

mod branch;
mod branch_name;
pub mod cleanup;
mod cli;
mod context;
mod worktree;

pub use branch::Divergence;
pub use branch_name::is_valid_branch_name;
pub use cleanup::{find_orphaned, CleanupOptions, CleanupReport};
pub use cli::Repository;
pub use context::ExecContext;
pub use worktree::{parse_porcelain, WorktreeEntry};
