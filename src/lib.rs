//! ticket-worktree - git worktree and branch lifecycle for a file-based
//! ticket tracker.
//!
//! Starting a ticket provisions a dedicated branch and linked worktree;
//! closing and cleanup run commands inside that worktree and remove it once
//! the ticket is no longer active. Everything here shells out to git.

pub mod config;
pub mod error;
pub mod git;
pub mod logging;

pub use error::{Error, ErrorKind, Result};
