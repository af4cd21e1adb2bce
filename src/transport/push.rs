//! push (local/file transports only): copy missing objects into the peer
//! and CAS its ref, refusing non-fast-forward unless forced

use std::collections::HashSet;

use tracing::info;

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::object::Object;
use crate::refs;
use crate::repo::Repository;
use crate::revision;
use crate::transport::local::LocalTransport;
use crate::transport::Transport;

#[derive(Debug)]
pub struct PushResult {
    pub refname: String,
    pub old: Option<ObjectId>,
    pub new: ObjectId,
    pub objects_sent: usize,
}

/// push a local revision to `dst_ref` on the remote
pub fn push(
    repo: &Repository,
    remote: &str,
    src_rev: &str,
    dst_ref: &str,
    force: bool,
) -> Result<PushResult> {
    let url = repo
        .load_config()?
        .remote(remote)
        .map(|r| r.url)
        .ok_or_else(|| Error::Config(format!("remote '{remote}' is not configured")))?;
    let path = url
        .strip_prefix("file://")
        .unwrap_or(&url);
    if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("git://") {
        return Err(Error::TransportError(
            "push supports local and file:// remotes only".into(),
        ));
    }

    let src_id = revision::rev_parse_peeled(repo, src_rev)?;
    let mut transport = LocalTransport::open(std::path::Path::new(path))?;
    let current_remote = refs::resolve(transport.repo(), dst_ref)?;

    // ship everything reachable locally that the peer lacks; objects land
    // before the ref decision, as with a pack upload
    let needed: HashSet<ObjectId> = graph::reachable_objects(repo, &[src_id])?;
    let mut objects_sent = 0;
    for id in &needed {
        if transport.has_object(id)? {
            continue;
        }
        let (kind, content) = repo.odb().load_content(id)?;
        transport.repo().odb().store(&Object::parse(kind, &content)?)?;
        objects_sent += 1;
    }

    // non-fast-forward check, now that the peer can walk both histories
    if let Some(current) = current_remote {
        if !force && !graph::is_ancestor(transport.repo(), &current, &src_id)? {
            return Err(Error::RefUpdateRejected {
                refname: dst_ref.to_string(),
                reason: format!("non-fast-forward from {current} to {src_id}"),
            });
        }
    }

    // CAS on the value observed above; forced pushes re-read instead
    let old = if force { None } else { current_remote };
    refs::update_ref(
        transport.repo(),
        dst_ref,
        &src_id,
        old.as_ref(),
        &format!("push from {}", repo.work_dir().display()),
    )?;
    info!(dst_ref, objects = objects_sent, "push done");
    Ok(PushResult {
        refname: dst_ref.to_string(),
        old: current_remote,
        new: src_id,
        objects_sent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::add::add_path;
    use crate::ops::commit::{commit, CommitOutcome};
    use tempfile::tempdir;

    fn commit_file(repo: &Repository, name: &str, content: &[u8], msg: &str) -> ObjectId {
        std::fs::write(repo.work_dir().join(name), content).unwrap();
        add_path(repo, name, false).unwrap();
        match commit(repo, Some(msg)).unwrap() {
            CommitOutcome::Created(id) => id,
            _ => panic!("expected commit"),
        }
    }

    fn pair() -> (tempfile::TempDir, Repository, tempfile::TempDir, Repository) {
        let src_dir = tempdir().unwrap();
        let src = Repository::init(src_dir.path()).unwrap();
        let dst_dir = tempdir().unwrap();
        let dst = Repository::init(dst_dir.path()).unwrap();
        let mut config = src.load_config().unwrap();
        config
            .add_remote("origin", dst_dir.path().to_str().unwrap())
            .unwrap();
        src.save_config(&config).unwrap();
        (src_dir, src, dst_dir, dst)
    }

    #[test]
    fn test_push_new_branch() {
        let (_sd, src, _dd, dst) = pair();
        let c1 = commit_file(&src, "a.txt", b"A\n", "c1");

        let result = push(&src, "origin", "HEAD", "refs/heads/main", false).unwrap();
        assert_eq!(result.new, c1);
        assert!(result.objects_sent >= 3);
        assert_eq!(refs::resolve(&dst, "refs/heads/main").unwrap(), Some(c1));
        assert!(dst.odb().exists(&c1));
    }

    #[test]
    fn test_push_fast_forward_then_reject_diverged() {
        let (_sd, src, _dd, dst) = pair();
        let c1 = commit_file(&src, "a.txt", b"A\n", "c1");
        push(&src, "origin", "HEAD", "refs/heads/main", false).unwrap();

        let c2 = commit_file(&src, "a.txt", b"B\n", "c2");
        let result = push(&src, "origin", "HEAD", "refs/heads/main", false).unwrap();
        assert_eq!(result.old, Some(c1));
        assert_eq!(result.new, c2);

        // rewind local and commit something else: now divergent
        crate::ops::reset::reset(&src, crate::ops::reset::ResetMode::Hard, &c1.to_hex())
            .unwrap();
        commit_file(&src, "a.txt", b"C\n", "c3");
        assert!(matches!(
            push(&src, "origin", "HEAD", "refs/heads/main", false),
            Err(Error::RefUpdateRejected { .. })
        ));

        // forced push wins
        let forced = push(&src, "origin", "HEAD", "refs/heads/main", true).unwrap();
        assert_eq!(refs::resolve(&dst, "refs/heads/main").unwrap(), Some(forced.new));
    }

    #[test]
    fn test_push_skips_existing_objects() {
        let (_sd, src, _dd, _dst) = pair();
        commit_file(&src, "a.txt", b"A\n", "c1");
        push(&src, "origin", "HEAD", "refs/heads/main", false).unwrap();
        commit_file(&src, "b.txt", b"B\n", "c2");

        let result = push(&src, "origin", "HEAD", "refs/heads/main", false).unwrap();
        // only the new commit, new tree, new blob travel
        assert_eq!(result.objects_sent, 3);
    }
}
