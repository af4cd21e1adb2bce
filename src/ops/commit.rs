//! creating commits from the staging index

use std::fs;

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::index::Index;
use crate::object::{Commit, Object};
use crate::ops::identity;
use crate::refs::{self, HeadState};
use crate::repo::Repository;
use crate::worktree;

/// result of a commit attempt
#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Created(ObjectId),
    /// index tree equals HEAD tree (and no merge is being concluded)
    NothingToCommit,
}

/// pending merge parent recorded by a conflicted merge
pub fn merge_head(repo: &Repository) -> Option<ObjectId> {
    let raw = fs::read_to_string(repo.git_dir().join("MERGE_HEAD")).ok()?;
    ObjectId::from_hex(raw.trim()).ok()
}

pub fn merge_message(repo: &Repository) -> Option<String> {
    fs::read_to_string(repo.git_dir().join("MERGE_MSG")).ok()
}

/// write merge-in-progress state (conflicted merge awaiting commit)
pub fn write_merge_state(repo: &Repository, their_head: &ObjectId, message: &str) -> Result<()> {
    let head_file = repo.git_dir().join("MERGE_HEAD");
    fs::write(&head_file, format!("{their_head}\n")).with_path(&head_file)?;
    let msg_file = repo.git_dir().join("MERGE_MSG");
    fs::write(&msg_file, message).with_path(&msg_file)?;
    Ok(())
}

pub fn clear_merge_state(repo: &Repository) {
    let _ = fs::remove_file(repo.git_dir().join("MERGE_HEAD"));
    let _ = fs::remove_file(repo.git_dir().join("MERGE_MSG"));
}

/// create a commit from the index.
///
/// a pending MERGE_HEAD becomes the second parent and is cleared on
/// success. unmerged index entries refuse the commit.
pub fn commit(repo: &Repository, message: Option<&str>) -> Result<CommitOutcome> {
    let index = Index::load(repo)?;
    if index.has_conflicts() {
        return Err(Error::MergeConflict(index.unmerged_paths()));
    }

    let pending_merge = merge_head(repo);
    let message = match message {
        Some(message) => message.to_string(),
        None => merge_message(repo)
            .ok_or_else(|| Error::Config("empty commit message".into()))?,
    };

    let head = refs::head_id(repo)?;
    let tree = worktree::tree_from_index(repo, &index)?;

    if pending_merge.is_none() {
        if let Some(head_id) = head {
            let head_commit = graph::load_commit(repo, &head_id)?;
            if head_commit.tree == tree {
                return Ok(CommitOutcome::NothingToCommit);
            }
        } else if index.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }
    }

    let mut parents = Vec::new();
    if let Some(head_id) = head {
        parents.push(head_id);
    }
    if let Some(their_head) = pending_merge {
        parents.push(their_head);
    }

    let author = identity::author_ident(repo)?;
    let committer = identity::committer_ident(repo)?;
    let commit = Commit::new(tree, parents, author, committer, message.as_str());
    let subject = commit.subject().to_string();
    let id = repo.odb().store(&Object::Commit(commit))?;

    let reflog_message = format!("commit: {subject}");
    match refs::read_head(repo)? {
        HeadState::Symbolic(refname) => {
            refs::update_ref(repo, &refname, &id, head.as_ref(), &reflog_message)?;
        }
        HeadState::Detached(_) => {
            refs::update_head(repo, &HeadState::Detached(id), &reflog_message)?;
        }
    }

    if pending_merge.is_some() {
        clear_merge_state(repo);
    }
    debug!(commit = %id, "created commit");
    Ok(CommitOutcome::Created(id))
}
