//! Branch name validation.
//!
//! Branch names end up as positional arguments to git subcommands that also
//! accept flags, so anything caller-supplied goes through
//! [`is_valid_branch_name`] before it reaches a command line.

use crate::error::{Error, Result};

/// Characters git refuses in ref names, plus `\`.
const FORBIDDEN_CHARS: [char; 5] = [':', '?', '*', '[', '\\'];

/// Sequences that are either invalid refs or ref-expression syntax.
const FORBIDDEN_SEQUENCES: [&str; 3] = ["..", "@{", "//"];

/// Check whether a branch name is safe to hand to git.
pub fn is_valid_branch_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    if FORBIDDEN_SEQUENCES.iter().any(|seq| name.contains(seq)) {
        return false;
    }

    // git's own `branch` subcommand reparses the name, so a leading `-`
    // is read as a flag even after `--end-of-options`.
    if name.starts_with('-') {
        return false;
    }

    let bad_edge = |c: char| c == '/' || c == '.' || c.is_ascii_whitespace();
    if name.starts_with(bad_edge) || name.ends_with(bad_edge) {
        return false;
    }

    !name
        .chars()
        .any(|c| c.is_ascii_control() || c.is_ascii_whitespace() || FORBIDDEN_CHARS.contains(&c))
}

/// Reject `name` with a validation error tagged with `op`.
pub(crate) fn ensure_valid(op: &str, name: &str) -> Result<()> {
    if is_valid_branch_name(name) {
        Ok(())
    } else {
        Err(Error::invalid_branch(op, name))
    }
}
