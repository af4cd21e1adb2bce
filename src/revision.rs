//! revision grammar: names, short prefixes, `~N`, `^N`, `^{}`

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::{is_full_hex, is_hex_prefix, ObjectId};
use crate::refs::{self, HEADS_PREFIX, TAGS_PREFIX};
use crate::repo::Repository;

/// resolve a revision expression to an object id.
///
/// name precedence: HEAD, refs/heads/<n>, refs/tags/<n>, full hex, short
/// prefix. suffix operators: `~N` (first-parent ancestor), `^`/`^N`
/// (n-th parent), `^{}` (peel tags).
pub fn rev_parse(repo: &Repository, expr: &str) -> Result<ObjectId> {
    rev_parse_inner(repo, expr.trim(), false)
}

/// rev_parse, then peel tag chains to the underlying object
pub fn rev_parse_peeled(repo: &Repository, expr: &str) -> Result<ObjectId> {
    rev_parse_inner(repo, expr.trim(), true)
}

/// rev_parse peeled all the way to a commit
pub fn rev_parse_commit(repo: &Repository, expr: &str) -> Result<ObjectId> {
    let id = rev_parse_peeled(repo, expr)?;
    graph::peel_to_commit(repo, &id)
}

fn rev_parse_inner(repo: &Repository, expr: &str, peel: bool) -> Result<ObjectId> {
    if expr.is_empty() {
        return Err(Error::InvalidRevision(expr.to_string()));
    }

    if let Some(base) = expr.strip_suffix("^{}") {
        let id = rev_parse_inner(repo, base.trim(), false)?;
        return graph::peel_to_object(repo, &id);
    }

    // suffix operators bind tighter the further right they appear:
    // a~1^2 parses as (a~1)^2
    if let Some((base, op_at)) = last_operator(expr) {
        let count = &expr[op_at + 1..];
        let id = rev_parse_inner(repo, base, true)?;
        let id = graph::peel_to_commit(repo, &id)?;
        return match expr.as_bytes()[op_at] {
            b'~' => {
                let n: usize = parse_count(count, 1, expr)?;
                let mut current = id;
                for _ in 0..n {
                    current = graph::load_commit(repo, &current)?
                        .first_parent()
                        .ok_or_else(|| Error::InvalidRevision(expr.to_string()))?;
                }
                Ok(current)
            }
            b'^' => {
                let n: usize = parse_count(count, 1, expr)?;
                if n == 0 {
                    return Ok(id);
                }
                let parents = graph::parents(repo, &id)?;
                parents
                    .get(n - 1)
                    .copied()
                    .ok_or_else(|| Error::InvalidRevision(expr.to_string()))
            }
            _ => unreachable!("last_operator only yields ~ and ^"),
        };
    }

    let id = resolve_name(repo, expr)?;
    if peel {
        graph::peel_to_object(repo, &id)
    } else {
        Ok(id)
    }
}

/// find the rightmost `~`/`^` operator followed only by digits
fn last_operator(expr: &str) -> Option<(&str, usize)> {
    let bytes = expr.as_bytes();
    for at in (0..bytes.len()).rev() {
        match bytes[at] {
            b'~' | b'^' => {
                if bytes[at + 1..].iter().all(|b| b.is_ascii_digit()) && at > 0 {
                    return Some((&expr[..at], at));
                }
                return None;
            }
            b if b.is_ascii_digit() => continue,
            _ => return None,
        }
    }
    None
}

fn parse_count(s: &str, default: usize, expr: &str) -> Result<usize> {
    if s.is_empty() {
        return Ok(default);
    }
    s.parse()
        .map_err(|_| Error::InvalidRevision(expr.to_string()))
}

fn resolve_name(repo: &Repository, name: &str) -> Result<ObjectId> {
    if name == "HEAD" {
        return refs::head_id(repo)?
            .ok_or_else(|| Error::NoCommitsYet(refs::current_branch(repo).ok().flatten().unwrap_or_else(|| "HEAD".into())));
    }
    if name.starts_with("refs/") {
        if let Some(id) = refs::resolve(repo, name)? {
            return Ok(id);
        }
        return Err(Error::InvalidRevision(name.to_string()));
    }
    if let Some(id) = refs::resolve(repo, &format!("{HEADS_PREFIX}{name}"))? {
        return Ok(id);
    }
    if let Some(id) = refs::resolve(repo, &format!("{TAGS_PREFIX}{name}"))? {
        return Ok(id);
    }
    if is_full_hex(name) {
        let id = ObjectId::from_hex(&name.to_ascii_lowercase())?;
        if repo.odb().exists(&id) {
            return Ok(id);
        }
        return Err(Error::ObjectNotFound(name.to_string()));
    }
    if is_hex_prefix(name) {
        return match repo.odb().resolve_prefix(name) {
            Ok(id) => Ok(id),
            Err(Error::ObjectNotFound(_)) => Err(Error::InvalidRevision(name.to_string())),
            Err(e) => Err(e),
        };
    }
    Err(Error::InvalidRevision(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Commit, Ident, Kind, Object, Tag, Tree};
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn commit_with(repo: &Repository, parents: Vec<ObjectId>, msg: &str) -> ObjectId {
        let tree = Tree::from_entries(vec![]);
        let tree_id = repo.odb().store(&Object::Tree(tree)).unwrap();
        let ident = Ident::new("T <t@x>", 1700000000, "+0000");
        let commit = Commit::new(tree_id, parents, ident.clone(), ident, msg);
        repo.odb().store(&Object::Commit(commit)).unwrap()
    }

    fn graph3(repo: &Repository) -> (ObjectId, ObjectId, ObjectId) {
        let c1 = commit_with(repo, vec![], "c1");
        let c2 = commit_with(repo, vec![c1], "c2");
        let c3 = commit_with(repo, vec![c2], "c3");
        crate::refs::update_ref(repo, "refs/heads/main", &c3, None, "x").unwrap();
        (c1, c2, c3)
    }

    #[test]
    fn test_head_and_branch() {
        let (_dir, repo) = test_repo();
        let (_c1, _c2, c3) = graph3(&repo);
        assert_eq!(rev_parse(&repo, "HEAD").unwrap(), c3);
        assert_eq!(rev_parse(&repo, "main").unwrap(), c3);
        assert_eq!(rev_parse(&repo, "refs/heads/main").unwrap(), c3);
    }

    #[test]
    fn test_tilde_and_caret() {
        let (_dir, repo) = test_repo();
        let (c1, c2, c3) = graph3(&repo);
        assert_eq!(rev_parse(&repo, "HEAD~1").unwrap(), c2);
        assert_eq!(rev_parse(&repo, "HEAD~2").unwrap(), c1);
        assert_eq!(rev_parse(&repo, "HEAD~").unwrap(), c2);
        assert_eq!(rev_parse(&repo, "main^").unwrap(), c2);
        assert_eq!(rev_parse(&repo, "main^1").unwrap(), c2);
        assert_eq!(rev_parse(&repo, "main~1~1").unwrap(), c1);
        assert!(rev_parse(&repo, "HEAD~9").is_err());
        assert!(rev_parse(&repo, "main^2").is_err());
        let _ = c3;
    }

    #[test]
    fn test_second_parent_of_merge() {
        let (_dir, repo) = test_repo();
        let c1 = commit_with(&repo, vec![], "c1");
        let c2 = commit_with(&repo, vec![c1], "left");
        let c3 = commit_with(&repo, vec![c1], "right");
        let m = commit_with(&repo, vec![c2, c3], "merge");
        crate::refs::update_ref(&repo, "refs/heads/main", &m, None, "x").unwrap();

        assert_eq!(rev_parse(&repo, "main^1").unwrap(), c2);
        assert_eq!(rev_parse(&repo, "main^2").unwrap(), c3);
        // operators chain left to right: (main^2)~1
        assert_eq!(rev_parse(&repo, "main^2~1").unwrap(), c1);
    }

    #[test]
    fn test_full_hex_and_prefix() {
        let (_dir, repo) = test_repo();
        let (c1, _c2, _c3) = graph3(&repo);
        let hex = c1.to_hex();
        assert_eq!(rev_parse(&repo, &hex).unwrap(), c1);
        assert_eq!(rev_parse(&repo, &hex[..8]).unwrap(), c1);
        assert!(rev_parse(&repo, &hex[..3]).is_err());
    }

    #[test]
    fn test_head_precedence_over_tag() {
        let (_dir, repo) = test_repo();
        let (c1, _c2, c3) = graph3(&repo);
        // tag named "main" loses to the branch of the same name
        crate::refs::update_ref(&repo, "refs/tags/main", &c1, None, "x").unwrap();
        assert_eq!(rev_parse(&repo, "main").unwrap(), c3);
        assert_eq!(rev_parse(&repo, "refs/tags/main").unwrap(), c1);
    }

    #[test]
    fn test_peel_annotated_tag() {
        let (_dir, repo) = test_repo();
        let (_c1, _c2, c3) = graph3(&repo);
        let ident = Ident::new("T <t@x>", 1700000000, "+0000");
        let tag = Tag::new(c3, Kind::Commit, "v1", ident, "release");
        let tag_id = repo.odb().store(&Object::Tag(tag)).unwrap();
        crate::refs::update_ref(&repo, "refs/tags/v1", &tag_id, None, "x").unwrap();

        assert_eq!(rev_parse(&repo, "v1").unwrap(), tag_id);
        assert_eq!(rev_parse(&repo, "v1^{}").unwrap(), c3);
        assert_eq!(rev_parse_commit(&repo, "v1").unwrap(), c3);
        // operators peel through the tag
        assert_eq!(rev_parse(&repo, "v1~1").unwrap(), rev_parse(&repo, "HEAD~1").unwrap());
    }

    #[test]
    fn test_invalid_revision() {
        let (_dir, repo) = test_repo();
        graph3(&repo);
        assert!(matches!(
            rev_parse(&repo, "does-not-exist"),
            Err(Error::InvalidRevision(_))
        ));
        assert!(rev_parse(&repo, "").is_err());
    }

    #[test]
    fn test_unborn_head() {
        let (_dir, repo) = test_repo();
        assert!(matches!(
            rev_parse(&repo, "HEAD"),
            Err(Error::NoCommitsYet(_))
        ));
    }
}
