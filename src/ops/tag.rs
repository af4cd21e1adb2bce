//! tags: lightweight refs and annotated tag objects

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{Object, Tag};
use crate::ops::identity;
use crate::refs::{self, TAGS_PREFIX};
use crate::repo::Repository;
use crate::revision;

/// create a lightweight tag pointing at the peeled target
pub fn create_lightweight(
    repo: &Repository,
    name: &str,
    target: Option<&str>,
    force: bool,
) -> Result<ObjectId> {
    refs::validate_ref_name(name)?;
    let refname = format!("{TAGS_PREFIX}{name}");
    if refs::exists(repo, &refname) && !force {
        return Err(Error::RefUpdateRejected {
            refname,
            reason: "tag already exists".into(),
        });
    }
    let id = revision::rev_parse_peeled(repo, target.unwrap_or("HEAD"))?;
    refs::update_ref(repo, &refname, &id, None, &format!("tag: {name}"))?;
    Ok(id)
}

/// create an annotated tag object and point refs/tags/<name> at it
pub fn create_annotated(
    repo: &Repository,
    name: &str,
    target: Option<&str>,
    message: &str,
    force: bool,
) -> Result<ObjectId> {
    refs::validate_ref_name(name)?;
    let refname = format!("{TAGS_PREFIX}{name}");
    if refs::exists(repo, &refname) && !force {
        return Err(Error::RefUpdateRejected {
            refname,
            reason: "tag already exists".into(),
        });
    }
    let target_id = revision::rev_parse(repo, target.unwrap_or("HEAD"))?;
    let target_kind = repo.odb().load(&target_id)?.kind();
    let tagger = identity::committer_ident(repo)?;
    let tag = Tag::new(target_id, target_kind, name, tagger, message);
    let tag_id = repo.odb().store(&Object::Tag(tag))?;
    refs::update_ref(repo, &refname, &tag_id, None, &format!("tag: {name}"))?;
    Ok(tag_id)
}

pub fn delete(repo: &Repository, name: &str) -> Result<()> {
    refs::delete_ref(repo, &format!("{TAGS_PREFIX}{name}"))
}

pub fn list(repo: &Repository) -> Result<Vec<String>> {
    refs::list_tags(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;
    use crate::ops::add::add_path;
    use crate::ops::commit::{commit, CommitOutcome};
    use tempfile::tempdir;

    fn repo_with_commit() -> (tempfile::TempDir, Repository, ObjectId) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a"), b"A").unwrap();
        add_path(&repo, "a", false).unwrap();
        let CommitOutcome::Created(id) = commit(&repo, Some("c1")).unwrap() else {
            panic!()
        };
        (dir, repo, id)
    }

    #[test]
    fn test_lightweight_tag() {
        let (_dir, repo, head) = repo_with_commit();
        let id = create_lightweight(&repo, "v1", None, false).unwrap();
        assert_eq!(id, head);
        assert_eq!(
            refs::resolve(&repo, "refs/tags/v1").unwrap(),
            Some(head)
        );
        assert_eq!(list(&repo).unwrap(), vec!["v1"]);
    }

    #[test]
    fn test_annotated_tag_roundtrip() {
        let (_dir, repo, head) = repo_with_commit();
        let tag_id = create_annotated(&repo, "v2", None, "release v2", false).unwrap();
        assert_ne!(tag_id, head);

        let object = repo.odb().load(&tag_id).unwrap();
        let Object::Tag(tag) = &object else {
            panic!("expected tag object")
        };
        assert_eq!(tag.object, head);
        assert_eq!(tag.name, "v2");
        assert_eq!(tag.message, "release v2\n");
        // stored bytes re-hash to the same id
        assert_eq!(object.id(), tag_id);

        // peeling the tag lands on the commit
        assert_eq!(graph::peel_to_object(&repo, &tag_id).unwrap(), head);
        assert_eq!(
            crate::revision::rev_parse_peeled(&repo, "v2").unwrap(),
            head
        );
    }

    #[test]
    fn test_duplicate_needs_force() {
        let (_dir, repo, _head) = repo_with_commit();
        create_lightweight(&repo, "v1", None, false).unwrap();
        assert!(create_lightweight(&repo, "v1", None, false).is_err());
        create_lightweight(&repo, "v1", None, true).unwrap();
    }

    #[test]
    fn test_delete_tag() {
        let (_dir, repo, _head) = repo_with_commit();
        create_lightweight(&repo, "gone", None, false).unwrap();
        delete(&repo, "gone").unwrap();
        assert!(list(&repo).unwrap().is_empty());
        assert!(delete(&repo, "gone").is_err());
    }

    #[test]
    fn test_invalid_tag_name() {
        let (_dir, repo, _head) = repo_with_commit();
        assert!(create_lightweight(&repo, "bad tag", None, false).is_err());
        assert!(create_lightweight(&repo, "a..b", None, false).is_err());
    }
}
