//! garbage collection: reachability, repack into one whole-object pack,
//! prune redundant loose objects

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::odb::{encode_pack, write_idx};
use crate::error::IoResultExt;
use crate::refs::{self, HEADS_PREFIX, STASH_REF, TAGS_PREFIX};
use crate::repo::Repository;

/// every object reachable from refs (heads, tags, remotes, stash) and from
/// reflog tips
pub fn reachable_objects(repo: &Repository) -> Result<HashSet<ObjectId>> {
    let mut tips = Vec::new();
    for prefix in [HEADS_PREFIX, TAGS_PREFIX, "refs/remotes/"] {
        for refname in refs::list_with_prefix(repo, prefix)? {
            if let Some(id) = refs::resolve(repo, &refname)? {
                tips.push(id);
            }
            for entry in crate::reflog::read(repo, &refname)? {
                tips.push(entry.new);
            }
        }
    }
    if let Some(id) = refs::resolve(repo, STASH_REF)? {
        tips.push(id);
    }
    for entry in crate::reflog::read(repo, STASH_REF)? {
        tips.push(entry.new);
    }
    for entry in crate::reflog::read(repo, "HEAD")? {
        tips.push(entry.new);
    }
    if let Some(id) = refs::head_id(repo)? {
        tips.push(id);
    }
    tips.retain(|id| *id != ObjectId::ZERO);
    graph::reachable_objects(repo, &tips)
}

/// pack the given objects into `objects/pack/pack-<sha>.{pack,idx}`.
/// whole objects only; ids are packed in sorted order for determinism.
pub fn repack(repo: &Repository, ids: &[ObjectId]) -> Result<ObjectId> {
    if ids.is_empty() {
        return Err(Error::MalformedPack("refusing to write an empty pack".into()));
    }
    let mut sorted = ids.to_vec();
    sorted.sort();

    let (bytes, entries) = encode_pack(&sorted, |id| repo.odb().load_content(id))?;
    let pack_sha = ObjectId::from_slice(&bytes[bytes.len() - 20..])?;

    let pack_dir = repo.odb().pack_dir();
    std::fs::create_dir_all(&pack_dir).with_path(&pack_dir)?;
    let pack_path = pack_dir.join(format!("pack-{}.pack", pack_sha.to_hex()));
    let tmp = pack_dir.join(format!("tmp-{}.pack", uuid::Uuid::new_v4()));
    std::fs::write(&tmp, &bytes).with_path(&tmp)?;
    std::fs::rename(&tmp, &pack_path).with_path(&pack_path)?;
    write_idx(
        &pack_dir.join(format!("pack-{}.idx", pack_sha.to_hex())),
        &pack_sha,
        &entries,
    )?;
    repo.odb().rescan_packs();
    debug!(pack = %pack_path.display(), objects = sorted.len(), "repacked");
    Ok(pack_sha)
}

/// remove loose objects that already live in a pack
pub fn prune_packed(repo: &Repository) -> Result<usize> {
    let mut pruned = 0;
    for id in repo.odb().list_loose()? {
        if repo.odb().is_packed(&id) {
            repo.odb().remove_loose(&id)?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

/// remove loose objects unreachable from any ref or reflog tip
pub fn prune_unreachable(repo: &Repository) -> Result<usize> {
    let reachable = reachable_objects(repo)?;
    let mut pruned = 0;
    for id in repo.odb().list_loose()? {
        if !reachable.contains(&id) {
            repo.odb().remove_loose(&id)?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

/// gc summary
#[derive(Debug, Default)]
pub struct GcStats {
    pub packed: usize,
    pub pruned: usize,
    pub pack_sha: Option<ObjectId>,
}

/// pack all reachable objects; with `prune`, drop loose copies (both the
/// now-packed ones and anything unreachable)
pub fn gc(repo: &Repository, prune: bool) -> Result<GcStats> {
    let reachable = reachable_objects(repo)?;
    if reachable.is_empty() {
        return Ok(GcStats::default());
    }
    let ids: Vec<ObjectId> = reachable.iter().copied().collect();
    let pack_sha = repack(repo, &ids)?;
    let mut stats = GcStats {
        packed: ids.len(),
        pruned: 0,
        pack_sha: Some(pack_sha),
    };
    if prune {
        stats.pruned = prune_packed(repo)?;
        stats.pruned += prune_unreachable(repo)?;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Blob, Object};
    use crate::ops::add::add_path;
    use crate::ops::commit::{commit, CommitOutcome};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit_file(repo: &Repository, name: &str, content: &[u8], msg: &str) -> ObjectId {
        std::fs::write(repo.work_dir().join(name), content).unwrap();
        add_path(repo, name, false).unwrap();
        match commit(repo, Some(msg)).unwrap() {
            CommitOutcome::Created(id) => id,
            _ => panic!("expected commit"),
        }
    }

    #[test]
    fn test_reachable_includes_history() {
        let (_dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a", b"1\n", "c1");
        let c2 = commit_file(&repo, "a", b"2\n", "c2");

        let reachable = reachable_objects(&repo).unwrap();
        assert!(reachable.contains(&c1));
        assert!(reachable.contains(&c2));
        // trees and blobs come along
        let tree = graph::load_commit(&repo, &c2).unwrap().tree;
        assert!(reachable.contains(&tree));
    }

    #[test]
    fn test_gc_packs_and_objects_stay_loadable() {
        let (_dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a", b"1\n", "c1");
        let c2 = commit_file(&repo, "a", b"2\n", "c2");

        let stats = gc(&repo, true).unwrap();
        assert!(stats.packed >= 6); // 2 commits + 2 trees + 2 blobs
        assert!(stats.pruned >= stats.packed);

        // loose copies are gone but everything still loads via the pack
        assert!(repo.odb().list_loose().unwrap().is_empty());
        assert!(repo.odb().load(&c1).is_ok());
        assert!(repo.odb().load(&c2).is_ok());
    }

    #[test]
    fn test_prune_unreachable_drops_orphans() {
        let (_dir, repo) = test_repo();
        commit_file(&repo, "a", b"1\n", "c1");
        let orphan = repo
            .odb()
            .store(&Object::Blob(Blob::new(b"orphan".to_vec())))
            .unwrap();

        let pruned = prune_unreachable(&repo).unwrap();
        assert!(pruned >= 1);
        assert!(!repo.odb().exists(&orphan));
    }

    #[test]
    fn test_reflog_tips_stay_reachable() {
        let (_dir, repo) = test_repo();
        commit_file(&repo, "a", b"1\n", "c1");
        let c2 = commit_file(&repo, "a", b"2\n", "c2");
        // move the branch away from c2; it stays reachable via the reflog
        crate::ops::reset::reset(&repo, crate::ops::reset::ResetMode::Hard, "HEAD~1").unwrap();

        prune_unreachable(&repo).unwrap();
        assert!(repo.odb().exists(&c2));
    }

    #[test]
    fn test_gc_empty_repo() {
        let (_dir, repo) = test_repo();
        let stats = gc(&repo, false).unwrap();
        assert_eq!(stats.packed, 0);
        assert!(stats.pack_sha.is_none());
    }
}
