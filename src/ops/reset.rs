//! reset: move HEAD (soft), also the index (mixed), also the working tree
//! (hard)

use crate::error::Result;
use crate::graph;
use crate::hash::ObjectId;
use crate::refs::{self, HeadState};
use crate::repo::Repository;
use crate::revision;
use crate::worktree::{self, CheckoutPolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

/// move the current branch (or detached HEAD) to a revision
pub fn reset(repo: &Repository, mode: ResetMode, rev: &str) -> Result<ObjectId> {
    let target = revision::rev_parse_commit(repo, rev)?;
    let message = format!("reset: moving to {}", target.short());

    match refs::read_head(repo)? {
        HeadState::Symbolic(refname) => {
            refs::update_ref(repo, &refname, &target, None, &message)?;
        }
        HeadState::Detached(_) => {
            refs::update_head(repo, &HeadState::Detached(target), &message)?;
        }
    }

    match mode {
        ResetMode::Soft => {}
        ResetMode::Mixed => {
            let tree = graph::load_commit(repo, &target)?.tree;
            worktree::index_from_tree(repo, &tree)?.save(repo)?;
        }
        ResetMode::Hard => {
            let tree = graph::load_commit(repo, &target)?.tree;
            worktree::checkout_tree(repo, &tree, CheckoutPolicy::Force)?;
        }
    }
    Ok(target)
}
