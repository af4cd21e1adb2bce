//! stash: park index + working tree as a two-parent commit on refs/stash

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::index::{Index, IndexEntry};
use crate::object::{Blob, Commit, Object};
use crate::ops::identity;
use crate::ops::reset::{reset, ResetMode};
use crate::refs::{self, STASH_REF};
use crate::repo::Repository;
use crate::worktree::{self, CheckoutPolicy};

/// tree of the current working directory, using index paths as the file
/// list (untracked files are not stashed)
fn worktree_tree(repo: &Repository, index: &Index) -> Result<ObjectId> {
    let mut snapshot = Index::default();
    for entry in index.entries().iter().filter(|e| e.stage == 0) {
        let full = repo.work_dir().join(&entry.path);
        if full.is_file() {
            let content = std::fs::read(&full).map_err(|source| Error::Io {
                path: full.clone(),
                source,
            })?;
            let id = repo.odb().store(&Object::Blob(Blob::new(content)))?;
            snapshot.upsert(IndexEntry::bare(entry.path.clone(), id, entry.mode));
        }
    }
    worktree::tree_from_index(repo, &snapshot)
}

/// save index and working tree to the stash, then reset hard to HEAD.
///
/// the stash entry is a commit whose first parent is HEAD and whose second
/// parent captures the index; the entry itself captures the working tree.
pub fn stash_push(repo: &Repository, message: Option<&str>) -> Result<ObjectId> {
    let head = refs::head_id(repo)?
        .ok_or_else(|| Error::NoCommitsYet("cannot stash without a commit".into()))?;
    let index = Index::load(repo)?;
    if index.has_conflicts() {
        return Err(Error::MergeConflict(index.unmerged_paths()));
    }

    let branch = refs::current_branch(repo)?.unwrap_or_else(|| "detached HEAD".into());
    let ident = identity::committer_ident(repo)?;

    let index_tree = worktree::tree_from_index(repo, &index)?;
    let index_commit = Commit::new(
        index_tree,
        vec![head],
        ident.clone(),
        ident.clone(),
        format!("index on {branch}"),
    );
    let index_commit_id = repo.odb().store(&Object::Commit(index_commit))?;

    let work_tree = worktree_tree(repo, &index)?;
    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("WIP on {branch}: {}", head.short()));
    let stash_commit = Commit::new(
        work_tree,
        vec![head, index_commit_id],
        ident.clone(),
        ident,
        message.as_str(),
    );
    let stash_id = repo.odb().store(&Object::Commit(stash_commit))?;

    refs::update_ref(repo, STASH_REF, &stash_id, None, &message)?;
    reset(repo, ResetMode::Hard, &head.to_hex())?;
    Ok(stash_id)
}

/// stash entries as (label, message), newest first
pub fn stash_list(repo: &Repository) -> Result<Vec<(String, String)>> {
    let entries = crate::reflog::read(repo, STASH_REF)?;
    Ok(entries
        .iter()
        .rev()
        .enumerate()
        .map(|(n, entry)| (format!("stash@{{{n}}}"), entry.message.clone()))
        .collect())
}

/// resolve `stash@{n}` (or bare `stash`) to its commit
fn stash_commit_for(repo: &Repository, reference: &str) -> Result<ObjectId> {
    if reference == "stash" {
        return refs::resolve(repo, STASH_REF)?
            .ok_or_else(|| Error::ObjectNotFound("stash".into()));
    }
    let n: usize = reference
        .strip_prefix("stash@{")
        .and_then(|rest| rest.strip_suffix('}'))
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| Error::InvalidRevision(reference.to_string()))?;
    let entries = crate::reflog::read(repo, STASH_REF)?;
    if n >= entries.len() {
        return Err(Error::ObjectNotFound(reference.to_string()));
    }
    Ok(entries[entries.len() - 1 - n].new)
}

/// restore index and working tree from a stash entry, keeping it
pub fn stash_apply(repo: &Repository, reference: Option<&str>) -> Result<ObjectId> {
    let stash_id = stash_commit_for(repo, reference.unwrap_or("stash@{0}"))?;
    let stash = graph::load_commit(repo, &stash_id)?;
    if stash.parents.len() < 2 {
        return Err(Error::MalformedObject(format!(
            "stash entry {stash_id} lacks an index parent"
        )));
    }
    let index_commit = graph::load_commit(repo, &stash.parents[1])?;

    // index first, then lay the stashed working tree over it
    worktree::checkout_tree(repo, &index_commit.tree, CheckoutPolicy::Force)?;
    let work = worktree::flatten_tree(repo, &stash.tree)?;
    let mut index = Index::load(repo)?;
    for (path, (id, mode)) in &work {
        let content = repo.odb().load(id)?.as_blob()?.content.clone();
        let full = repo.work_dir().join(path);
        worktree::materialize_file(&full, &content, *mode)?;
        if index.get(path).is_none() {
            index.upsert(IndexEntry::bare(path.clone(), *id, *mode));
        }
    }
    index.save(repo)?;
    Ok(stash_id)
}

/// apply and drop the newest stash entry
pub fn stash_pop(repo: &Repository, reference: Option<&str>) -> Result<ObjectId> {
    let applied = stash_apply(repo, reference)?;
    drop_newest(repo)?;
    Ok(applied)
}

/// remove the newest entry, repointing refs/stash at the next one
pub fn drop_newest(repo: &Repository) -> Result<()> {
    let entries = crate::reflog::read(repo, STASH_REF)?;
    if entries.len() <= 1 {
        if refs::exists(repo, STASH_REF) {
            refs::delete_ref(repo, STASH_REF)?;
        }
    } else {
        let next = entries[entries.len() - 2].new;
        refs::update_ref(repo, STASH_REF, &next, None, "stash: drop")?;
        // update_ref appended a line; drop it along with the popped entry
        crate::reflog::drop_newest(repo, STASH_REF)?;
    }
    crate::reflog::drop_newest(repo, STASH_REF)?;
    Ok(())
}
