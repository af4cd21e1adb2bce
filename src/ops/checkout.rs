//! switching branches and detaching HEAD

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::refs::{self, HeadState, HEADS_PREFIX};
use crate::repo::Repository;
use crate::revision;
use crate::worktree::{self, CheckoutPolicy};

/// what a checkout did
#[derive(Debug, PartialEq, Eq)]
pub enum CheckoutOutcome {
    SwitchedBranch { name: String, id: ObjectId },
    CreatedBranch { name: String, id: ObjectId },
    Detached(ObjectId),
}

/// check out a branch (optionally creating it) or any commit-ish
/// (detaching). local modifications refuse the switch unless `force`.
pub fn checkout(
    repo: &Repository,
    target: &str,
    create: bool,
    force: bool,
) -> Result<CheckoutOutcome> {
    let policy = if force {
        CheckoutPolicy::Force
    } else {
        CheckoutPolicy::Safe
    };
    let old = refs::head_id(repo)?;
    let from = refs::current_branch(repo)?
        .or_else(|| old.map(|id| id.short()))
        .unwrap_or_else(|| "unborn".into());

    let branch_ref = format!("{HEADS_PREFIX}{target}");
    if create {
        if refs::exists(repo, &branch_ref) {
            return Err(Error::RefUpdateRejected {
                refname: branch_ref,
                reason: "branch already exists".into(),
            });
        }
        refs::validate_ref_name(target)?;
        let id = old.ok_or_else(|| Error::NoCommitsYet("main".into()))?;
        refs::update_ref(repo, &branch_ref, &id, None, &format!("branch: Created from {from}"))?;
        refs::update_head(
            repo,
            &HeadState::Symbolic(branch_ref),
            &format!("checkout: moving from {from} to {target}"),
        )?;
        return Ok(CheckoutOutcome::CreatedBranch {
            name: target.to_string(),
            id,
        });
    }

    if let Some(id) = refs::resolve(repo, &branch_ref)? {
        let tree = graph::load_commit(repo, &id)?.tree;
        worktree::checkout_tree(repo, &tree, policy)?;
        refs::update_head(
            repo,
            &HeadState::Symbolic(branch_ref),
            &format!("checkout: moving from {from} to {target}"),
        )?;
        return Ok(CheckoutOutcome::SwitchedBranch {
            name: target.to_string(),
            id,
        });
    }

    // not a branch: detach at any commit-ish
    let id = revision::rev_parse_commit(repo, target)?;
    let tree = graph::load_commit(repo, &id)?.tree;
    worktree::checkout_tree(repo, &tree, policy)?;
    refs::update_head(
        repo,
        &HeadState::Detached(id),
        &format!("checkout: moving from {from} to {}", id.short()),
    )?;
    Ok(CheckoutOutcome::Detached(id))
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn test_create_and_switch() {
        let (dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a.txt", b"A\n", "c1");

        let outcome = checkout(&repo, "feature", true, false).unwrap();
        assert_eq!(
            outcome,
            CheckoutOutcome::CreatedBranch {
                name: "feature".into(),
                id: c1
            }
        );
        assert_eq!(refs::current_branch(&repo).unwrap().as_deref(), Some("feature"));

        commit_file(&repo, "b.txt", b"B\n", "c2");
        checkout(&repo, "main", false, false).unwrap();
        assert_eq!(refs::current_branch(&repo).unwrap().as_deref(), Some("main"));
        // b.txt came from the feature branch only
        assert!(!dir.path().join("b.txt").exists());
        assert!(dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_detached_checkout() {
        let (_dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a.txt", b"A\n", "c1");
        commit_file(&repo, "a.txt", b"B\n", "c2");

        let outcome = checkout(&repo, &c1.to_hex(), false, false).unwrap();
        assert_eq!(outcome, CheckoutOutcome::Detached(c1));
        assert_eq!(refs::current_branch(&repo).unwrap(), None);
        assert_eq!(refs::head_id(&repo).unwrap(), Some(c1));
    }

    #[test]
    fn test_dirty_tree_refuses_switch() {
        let (dir, repo) = test_repo();
        commit_file(&repo, "a.txt", b"A\n", "c1");
        checkout(&repo, "dev", true, false).unwrap();
        commit_file(&repo, "a.txt", b"DEV\n", "c2");

        std::fs::write(dir.path().join("a.txt"), b"local edit\n").unwrap();
        assert!(matches!(
            checkout(&repo, "main", false, false),
            Err(Error::DirtyWorkingTree)
        ));
        // force discards the local edit
        checkout(&repo, "main", false, true).unwrap();
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"A\n");
    }

    #[test]
    fn test_unknown_target() {
        let (_dir, repo) = test_repo();
        commit_file(&repo, "a.txt", b"A\n", "c1");
        assert!(checkout(&repo, "nope", false, false).is_err());
    }
}
