//! commit graph: parent walks, topological ordering, merge base,
//! reachability closures

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{Commit, Object};
use crate::repo::Repository;

/// load and parse a commit
pub fn load_commit(repo: &Repository, id: &ObjectId) -> Result<Commit> {
    repo.odb().load(id)?.as_commit().cloned()
}

/// parent ids of a commit, in commit-object order
pub fn parents(repo: &Repository, id: &ObjectId) -> Result<Vec<ObjectId>> {
    Ok(load_commit(repo, id)?.parents)
}

/// peel a tag chain down to the underlying non-tag object
pub fn peel_to_object(repo: &Repository, id: &ObjectId) -> Result<ObjectId> {
    let mut current = *id;
    loop {
        match repo.odb().load(&current)? {
            Object::Tag(tag) => current = tag.object,
            _ => return Ok(current),
        }
    }
}

/// peel to a commit; errors if the chain ends elsewhere
pub fn peel_to_commit(repo: &Repository, id: &ObjectId) -> Result<ObjectId> {
    let peeled = peel_to_object(repo, id)?;
    match repo.odb().load(&peeled)? {
        Object::Commit(_) => Ok(peeled),
        other => Err(Error::InvalidRevision(format!(
            "{id} peels to a {}, not a commit",
            other.kind()
        ))),
    }
}

/// walk the first-parent chain from tip, newest first, up to limit commits
pub fn walk_first_parent(
    repo: &Repository,
    tip: &ObjectId,
    limit: Option<usize>,
) -> Result<Vec<ObjectId>> {
    let mut out = Vec::new();
    let mut current = Some(*tip);
    while let Some(id) = current {
        if limit.is_some_and(|n| out.len() >= n) {
            break;
        }
        let commit = load_commit(repo, &id)?;
        out.push(id);
        current = commit.first_parent();
    }
    Ok(out)
}

/// all commits reachable from the tips, ordered newest-first by committer
/// timestamp; equal timestamps keep first-discovery order (stable walk)
pub fn walk_topological(repo: &Repository, tips: &[ObjectId]) -> Result<Vec<ObjectId>> {
    let mut seen = HashSet::new();
    let mut discovered: Vec<(ObjectId, i64, usize)> = Vec::new();
    let mut queue: VecDeque<ObjectId> = tips.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let commit = match load_commit(repo, &id) {
            Ok(commit) => commit,
            // missing parents terminate the walk on that line (shallow-ish)
            Err(Error::ObjectNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        discovered.push((id, commit.committer.timestamp, discovered.len()));
        for parent in commit.parents {
            if !seen.contains(&parent) {
                queue.push_back(parent);
            }
        }
    }
    discovered.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    Ok(discovered.into_iter().map(|(id, _, _)| id).collect())
}

/// commit ids reachable from start (start included)
pub fn ancestors(repo: &Repository, start: &ObjectId) -> Result<HashSet<ObjectId>> {
    let mut out = HashSet::new();
    let mut queue = VecDeque::from([*start]);
    while let Some(id) = queue.pop_front() {
        if !out.insert(id) {
            continue;
        }
        match load_commit(repo, &id) {
            Ok(commit) => queue.extend(commit.parents),
            Err(Error::ObjectNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// true if `anc` is reachable from `desc` (a commit is its own ancestor)
pub fn is_ancestor(repo: &Repository, anc: &ObjectId, desc: &ObjectId) -> Result<bool> {
    if anc == desc {
        return Ok(true);
    }
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*desc]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if id == *anc {
            return Ok(true);
        }
        match load_commit(repo, &id) {
            Ok(commit) => queue.extend(commit.parents),
            Err(Error::ObjectNotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

/// best common ancestor of a and b, or None with disjoint histories.
///
/// candidates are the intersection of both ancestor sets; any candidate
/// that is a strict ancestor of another candidate is discarded, and the
/// survivor with the newest committer timestamp wins (symmetric in a/b).
pub fn merge_base(repo: &Repository, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>> {
    let from_a = ancestors(repo, a)?;
    let from_b = ancestors(repo, b)?;
    let both: HashSet<ObjectId> = from_a.intersection(&from_b).copied().collect();
    if both.is_empty() {
        return Ok(None);
    }

    // mark strict ancestors of candidates, staying inside the candidate set
    let mut stale: HashSet<ObjectId> = HashSet::new();
    for candidate in &both {
        let mut queue: VecDeque<ObjectId> = parents(repo, candidate)?
            .into_iter()
            .filter(|p| both.contains(p))
            .collect();
        while let Some(id) = queue.pop_front() {
            if !stale.insert(id) {
                continue;
            }
            for parent in parents(repo, &id)? {
                if both.contains(&parent) && !stale.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
    }

    let mut best: Option<(i64, ObjectId)> = None;
    for candidate in both {
        if stale.contains(&candidate) {
            continue;
        }
        let ts = load_commit(repo, &candidate)?.committer.timestamp;
        let better = match &best {
            None => true,
            Some((best_ts, best_id)) => {
                ts > *best_ts || (ts == *best_ts && candidate.to_hex() < best_id.to_hex())
            }
        };
        if better {
            best = Some((ts, candidate));
        }
    }
    Ok(best.map(|(_, id)| id))
}

/// every object id reachable from the given tips: commits, their trees and
/// blobs, and tag objects along the way
pub fn reachable_objects(repo: &Repository, tips: &[ObjectId]) -> Result<HashSet<ObjectId>> {
    let mut out = HashSet::new();
    let mut queue: VecDeque<ObjectId> = tips.iter().copied().collect();
    while let Some(id) = queue.pop_front() {
        if out.contains(&id) {
            continue;
        }
        let object = match repo.odb().load(&id) {
            Ok(object) => object,
            Err(Error::ObjectNotFound(_)) => continue,
            Err(e) => return Err(e),
        };
        out.insert(id);
        match object {
            Object::Commit(commit) => {
                queue.push_back(commit.tree);
                queue.extend(commit.parents);
            }
            Object::Tree(tree) => {
                for entry in tree.entries() {
                    queue.push_back(entry.id);
                }
            }
            Object::Tag(tag) => queue.push_back(tag.object),
            Object::Blob(_) => {}
        }
    }
    Ok(out)
}
