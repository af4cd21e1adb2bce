//! rebase: replay the current branch's commits onto an upstream, one
//! cherry-pick at a time, with resumable todo/done state

use std::fs;
use std::path::PathBuf;

use crate::error::{Error, IoResultExt, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::ops::cherry_pick;
use crate::ops::reset::{reset, ResetMode};
use crate::ops::status;
use crate::refs::{self, HeadState, HEADS_PREFIX};
use crate::repo::Repository;
use crate::revision;

const REBASE_ORIG_HEAD: &str = "REBASE_ORIG_HEAD";
const REBASE_UPSTREAM: &str = "REBASE_UPSTREAM";
const REBASE_BRANCH: &str = "REBASE_BRANCH";
const REBASE_TODO: &str = "REBASE_TODO";
const REBASE_DONE: &str = "REBASE_DONE";

fn state_file(repo: &Repository, name: &str) -> PathBuf {
    repo.state_dir().join(name)
}

/// persisted rebase state
pub struct RebaseState {
    pub orig_head: ObjectId,
    pub upstream: ObjectId,
    pub branch: String,
    pub todo: Vec<ObjectId>,
    pub done: Vec<ObjectId>,
}

pub fn in_progress(repo: &Repository) -> bool {
    state_file(repo, REBASE_ORIG_HEAD).exists()
}

fn read_id_list(repo: &Repository, name: &str) -> Vec<ObjectId> {
    fs::read_to_string(state_file(repo, name))
        .unwrap_or_default()
        .lines()
        .filter_map(|line| ObjectId::from_hex(line.trim()).ok())
        .collect()
}

pub fn read_state(repo: &Repository) -> Result<Option<RebaseState>> {
    let Ok(raw) = fs::read_to_string(state_file(repo, REBASE_ORIG_HEAD)) else {
        return Ok(None);
    };
    let orig_head = ObjectId::from_hex(raw.trim())
        .map_err(|_| Error::MalformedRef(format!("REBASE_ORIG_HEAD: {}", raw.trim())))?;
    let upstream = fs::read_to_string(state_file(repo, REBASE_UPSTREAM))
        .ok()
        .and_then(|s| ObjectId::from_hex(s.trim()).ok())
        .unwrap_or(ObjectId::ZERO);
    let branch = fs::read_to_string(state_file(repo, REBASE_BRANCH))
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(Some(RebaseState {
        orig_head,
        upstream,
        branch,
        todo: read_id_list(repo, REBASE_TODO),
        done: read_id_list(repo, REBASE_DONE),
    }))
}

fn write_state(repo: &Repository, state: &RebaseState) -> Result<()> {
    let dir = repo.state_dir();
    fs::create_dir_all(&dir).with_path(&dir)?;
    let write = |name: &str, content: String| -> Result<()> {
        fs::write(state_file(repo, name), content).with_path(state_file(repo, name))
    };
    write(REBASE_ORIG_HEAD, format!("{}\n", state.orig_head))?;
    write(REBASE_UPSTREAM, format!("{}\n", state.upstream))?;
    write(REBASE_BRANCH, format!("{}\n", state.branch))?;
    write(
        REBASE_TODO,
        state
            .todo
            .iter()
            .map(|id| format!("{id}\n"))
            .collect::<String>(),
    )?;
    write(
        REBASE_DONE,
        state
            .done
            .iter()
            .map(|id| format!("{id}\n"))
            .collect::<String>(),
    )?;
    Ok(())
}

fn clear_state(repo: &Repository) {
    for name in [
        REBASE_ORIG_HEAD,
        REBASE_UPSTREAM,
        REBASE_BRANCH,
        REBASE_TODO,
        REBASE_DONE,
    ] {
        let _ = fs::remove_file(state_file(repo, name));
    }
    let _ = fs::remove_file(repo.git_dir().join("ORIG_HEAD"));
}

/// first-parent commits of head not reachable from upstream, oldest first
fn commits_to_replay(
    repo: &Repository,
    head: &ObjectId,
    upstream: &ObjectId,
) -> Result<Vec<ObjectId>> {
    let upstream_set = graph::ancestors(repo, upstream)?;
    let mut picked = Vec::new();
    let mut current = Some(*head);
    while let Some(id) = current {
        if upstream_set.contains(&id) {
            break;
        }
        picked.push(id);
        current = graph::load_commit(repo, &id)?.first_parent();
    }
    picked.reverse();
    Ok(picked)
}

#[derive(Debug, PartialEq, Eq)]
pub enum RebaseOutcome {
    AlreadyUpToDate,
    Finished { new_head: ObjectId, replayed: usize },
}

/// rebase the current branch onto upstream
pub fn rebase(repo: &Repository, upstream: &str) -> Result<RebaseOutcome> {
    if in_progress(repo) {
        return Err(Error::AlreadyInProgress("rebase"));
    }
    if status::is_dirty(repo)? {
        return Err(Error::DirtyWorkingTree);
    }
    let branch = refs::current_branch(repo)?
        .ok_or_else(|| Error::MalformedRef("cannot rebase a detached HEAD".into()))?;
    let head = refs::head_id(repo)?
        .ok_or_else(|| Error::NoCommitsYet(branch.clone()))?;
    let upstream_id = revision::rev_parse_commit(repo, upstream)?;

    let todo = commits_to_replay(repo, &head, &upstream_id)?;
    if todo.is_empty() || graph::is_ancestor(repo, &upstream_id, &head)? {
        return Ok(RebaseOutcome::AlreadyUpToDate);
    }

    // state goes down before any ref moves; a crash leaves it recoverable
    let orig_head_file = repo.git_dir().join("ORIG_HEAD");
    fs::write(&orig_head_file, format!("{head}\n")).with_path(&orig_head_file)?;
    let mut state = RebaseState {
        orig_head: head,
        upstream: upstream_id,
        branch: branch.clone(),
        todo: todo.clone(),
        done: Vec::new(),
    };
    write_state(repo, &state)?;

    refs::update_head(
        repo,
        &HeadState::Detached(upstream_id),
        &format!("rebase: start onto {}", upstream_id.short()),
    )?;
    reset(repo, ResetMode::Hard, &upstream_id.to_hex())?;

    replay_remaining(repo, &mut state)
}

fn replay_remaining(repo: &Repository, state: &mut RebaseState) -> Result<RebaseOutcome> {
    while let Some(next) = state.todo.first().copied() {
        state.todo.remove(0);
        write_state(repo, state)?;
        match cherry_pick::cherry_pick(repo, &next.to_hex()) {
            Ok(_) => {
                state.done.push(next);
                write_state(repo, state)?;
            }
            Err(e) => return Err(e),
        }
    }
    finish(repo, state)
}

fn finish(repo: &Repository, state: &RebaseState) -> Result<RebaseOutcome> {
    let new_head = refs::head_id(repo)?
        .ok_or_else(|| Error::NoCommitsYet(state.branch.clone()))?;
    let refname = format!("{HEADS_PREFIX}{}", state.branch);
    refs::update_ref(repo, &refname, &new_head, None, "rebase: complete")?;
    refs::update_head(
        repo,
        &HeadState::Symbolic(refname),
        "rebase: returning to branch",
    )?;
    let replayed = state.done.len();
    clear_state(repo);
    Ok(RebaseOutcome::Finished { new_head, replayed })
}

/// resume after a conflict: conclude the stopped cherry-pick, then replay
/// the remaining todo entries
pub fn rebase_continue(repo: &Repository) -> Result<RebaseOutcome> {
    let mut state = read_state(repo)?.ok_or(Error::NothingInProgress("rebase"))?;
    if cherry_pick::in_progress(repo) {
        let picked = cherry_pick::read_state(repo)?
            .ok_or(Error::NothingInProgress("cherry-pick"))?
            .pick;
        cherry_pick::cherry_pick_continue(repo)?;
        state.done.push(picked);
        write_state(repo, &state)?;
    }
    replay_remaining(repo, &mut state)
}

/// abort: hard-reset back to ORIG_HEAD and restore the branch
pub fn rebase_abort(repo: &Repository) -> Result<()> {
    let state = read_state(repo)?.ok_or(Error::NothingInProgress("rebase"))?;
    cherry_pick::clear_state(repo);
    reset(repo, ResetMode::Hard, &state.orig_head.to_hex())?;
    let refname = format!("{HEADS_PREFIX}{}", state.branch);
    refs::update_ref(repo, &refname, &state.orig_head, None, "rebase: abort")?;
    refs::update_head(
        repo,
        &HeadState::Symbolic(refname),
        "rebase: returning to branch after abort",
    )?;
    clear_state(repo);
    Ok(())
}
