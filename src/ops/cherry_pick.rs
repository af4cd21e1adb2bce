//! cherry-pick: replay one commit onto HEAD via three-way merge

use std::fs;
use std::path::PathBuf;

use crate::error::{Error, IoResultExt, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::index::Index;
use crate::merge as tree_merge;
use crate::object::{Commit, Object};
use crate::ops::identity;
use crate::ops::reset::{reset, ResetMode};
use crate::ops::status;
use crate::refs::{self, HeadState};
use crate::repo::Repository;
use crate::revision;
use crate::worktree;

const PICK_HEAD: &str = "CHERRY_PICK_HEAD";
const PICK_ORIG_HEAD: &str = "CHERRY_PICK_ORIG_HEAD";
const PICK_MSG: &str = "CHERRY_PICK_MSG";
const PICK_CONFLICTS: &str = "CHERRY_PICK_CONFLICTS";

fn state_file(repo: &Repository, name: &str) -> PathBuf {
    repo.state_dir().join(name)
}

/// persisted cherry-pick state
pub struct PickState {
    pub pick: ObjectId,
    pub orig_head: ObjectId,
    pub message: String,
    pub conflicts: Vec<String>,
}

pub fn in_progress(repo: &Repository) -> bool {
    state_file(repo, PICK_HEAD).exists()
}

pub fn read_state(repo: &Repository) -> Result<Option<PickState>> {
    let head_file = state_file(repo, PICK_HEAD);
    let Ok(raw) = fs::read_to_string(&head_file) else {
        return Ok(None);
    };
    let pick = ObjectId::from_hex(raw.trim())
        .map_err(|_| Error::MalformedRef(format!("{}: {}", head_file.display(), raw.trim())))?;
    let orig_head = fs::read_to_string(state_file(repo, PICK_ORIG_HEAD))
        .ok()
        .and_then(|s| ObjectId::from_hex(s.trim()).ok())
        .unwrap_or(ObjectId::ZERO);
    let message = fs::read_to_string(state_file(repo, PICK_MSG)).unwrap_or_default();
    let conflicts = fs::read_to_string(state_file(repo, PICK_CONFLICTS))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect();
    Ok(Some(PickState {
        pick,
        orig_head,
        message,
        conflicts,
    }))
}

fn write_state(repo: &Repository, state: &PickState) -> Result<()> {
    let dir = repo.state_dir();
    fs::create_dir_all(&dir).with_path(&dir)?;
    fs::write(state_file(repo, PICK_HEAD), format!("{}\n", state.pick))
        .with_path(state_file(repo, PICK_HEAD))?;
    fs::write(
        state_file(repo, PICK_ORIG_HEAD),
        format!("{}\n", state.orig_head),
    )
    .with_path(state_file(repo, PICK_ORIG_HEAD))?;
    fs::write(state_file(repo, PICK_MSG), &state.message)
        .with_path(state_file(repo, PICK_MSG))?;
    if state.conflicts.is_empty() {
        let _ = fs::remove_file(state_file(repo, PICK_CONFLICTS));
    } else {
        fs::write(
            state_file(repo, PICK_CONFLICTS),
            state.conflicts.join("\n") + "\n",
        )
        .with_path(state_file(repo, PICK_CONFLICTS))?;
    }
    Ok(())
}

pub fn clear_state(repo: &Repository) {
    for name in [PICK_HEAD, PICK_ORIG_HEAD, PICK_MSG, PICK_CONFLICTS] {
        let _ = fs::remove_file(state_file(repo, name));
    }
}

/// commit the staged result with the picked commit's message and author
fn conclude(repo: &Repository, message: &str, author_of: &ObjectId) -> Result<ObjectId> {
    let index = Index::load(repo)?;
    let tree = worktree::tree_from_index(repo, &index)?;
    let head = refs::head_id(repo)?;
    let author = graph::load_commit(repo, author_of)?.author;
    let committer = identity::committer_ident(repo)?;
    let commit = Commit::new(
        tree,
        head.into_iter().collect(),
        author,
        committer,
        message,
    );
    let subject = commit.subject().to_string();
    let id = repo.odb().store(&Object::Commit(commit))?;

    let reflog_message = format!("cherry-pick: {subject}");
    match refs::read_head(repo)? {
        HeadState::Symbolic(refname) => {
            refs::update_ref(repo, &refname, &id, head.as_ref(), &reflog_message)?;
        }
        HeadState::Detached(_) => {
            refs::update_head(repo, &HeadState::Detached(id), &reflog_message)?;
        }
    }
    clear_state(repo);
    Ok(id)
}

/// apply the changes introduced by a commit on top of HEAD.
///
/// conflict leaves CHERRY_PICK_* state and stage-1/2/3 entries behind.
pub fn cherry_pick(repo: &Repository, rev: &str) -> Result<ObjectId> {
    if in_progress(repo) {
        return Err(Error::AlreadyInProgress("cherry-pick"));
    }
    if status::is_dirty(repo)? {
        return Err(Error::DirtyWorkingTree);
    }

    let pick = revision::rev_parse_commit(repo, rev)?;
    let picked = graph::load_commit(repo, &pick)?;
    let head = refs::head_id(repo)?;

    let base_tree = match picked.first_parent() {
        Some(parent) => Some(graph::load_commit(repo, &parent)?.tree),
        None => None,
    };
    let ours_tree = match head {
        Some(head_id) => Some(graph::load_commit(repo, &head_id)?.tree),
        None => None,
    };

    let state = PickState {
        pick,
        orig_head: head.unwrap_or(ObjectId::ZERO),
        message: picked.message.clone(),
        conflicts: Vec::new(),
    };
    write_state(repo, &state)?;

    let result = tree_merge::merge_trees(
        repo,
        base_tree.as_ref(),
        ours_tree.as_ref(),
        Some(&picked.tree),
        "HEAD",
        &pick.short(),
    )?;
    tree_merge::apply_merge(repo, &result)?;

    if !result.is_clean() {
        let conflicts = result.conflict_paths();
        write_state(
            repo,
            &PickState {
                conflicts: conflicts.clone(),
                ..state
            },
        )?;
        return Err(Error::MergeConflict(conflicts));
    }

    conclude(repo, &picked.message, &pick)
}

/// finish a conflicted cherry-pick after manual resolution
pub fn cherry_pick_continue(repo: &Repository) -> Result<ObjectId> {
    let state = read_state(repo)?.ok_or(Error::NothingInProgress("cherry-pick"))?;
    let index = Index::load(repo)?;
    if index.has_conflicts() {
        return Err(Error::MergeConflict(index.unmerged_paths()));
    }
    conclude(repo, &state.message, &state.pick)
}

/// abort and restore the pre-pick HEAD
pub fn cherry_pick_abort(repo: &Repository) -> Result<()> {
    let state = read_state(repo)?.ok_or(Error::NothingInProgress("cherry-pick"))?;
    if state.orig_head == ObjectId::ZERO {
        return Err(Error::NothingInProgress("cherry-pick"));
    }
    reset(repo, ResetMode::Hard, &state.orig_head.to_hex())?;
    clear_state(repo);
    Ok(())
}
