//! local transport: read the peer repository's refs and objects directly

use std::path::Path;

use crate::error::Result;
use crate::hash::ObjectId;
use crate::object::Kind;
use crate::refs::{self, HeadState, HEADS_PREFIX, TAGS_PREFIX};
use crate::repo::Repository;
use crate::transport::Transport;

pub struct LocalTransport {
    repo: Repository,
}

impl LocalTransport {
    /// open the repository at path (worktree root or bare-ish `.git`)
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            repo: Repository::open(path)?,
        })
    }

    /// the peer repository (push writes into it)
    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}

impl Transport for LocalTransport {
    fn list_refs(&mut self) -> Result<Vec<(String, ObjectId)>> {
        let mut out = Vec::new();
        if let HeadState::Symbolic(target) = refs::read_head(&self.repo)? {
            if let Some(id) = refs::resolve(&self.repo, &target)? {
                out.push(("HEAD".to_string(), id));
            }
        }
        for prefix in [HEADS_PREFIX, TAGS_PREFIX] {
            for refname in refs::list_with_prefix(&self.repo, prefix)? {
                if let Some(id) = refs::resolve(&self.repo, &refname)? {
                    out.push((refname, id));
                }
            }
        }
        Ok(out)
    }

    fn get_object(&mut self, id: &ObjectId) -> Result<(Kind, Vec<u8>)> {
        self.repo.odb().load_content(id)
    }

    fn has_object(&mut self, id: &ObjectId) -> Result<bool> {
        Ok(self.repo.odb().exists(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::add::add_path;
    use crate::ops::commit::{commit, CommitOutcome};
    use tempfile::tempdir;

    #[test]
    fn test_list_refs_and_objects() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a"), b"A\n").unwrap();
        add_path(&repo, "a", false).unwrap();
        let CommitOutcome::Created(head) = commit(&repo, Some("c1")).unwrap() else {
            panic!()
        };

        let mut transport = LocalTransport::open(dir.path()).unwrap();
        let refs = transport.list_refs().unwrap();
        assert!(refs.contains(&("HEAD".to_string(), head)));
        assert!(refs.contains(&("refs/heads/main".to_string(), head)));

        assert!(transport.has_object(&head).unwrap());
        let (kind, _) = transport.get_object(&head).unwrap();
        assert_eq!(kind, Kind::Commit);

        let ghost = ObjectId::from_bytes([0xee; 20]);
        assert!(!transport.has_object(&ghost).unwrap());
        assert!(transport.get_object(&ghost).is_err());
    }
}
