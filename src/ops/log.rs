//! history listing: log (first-parent) and rev-list (full walk)

use crate::error::Result;
use crate::graph;
use crate::hash::ObjectId;
use crate::object::Commit;
use crate::refs::{self, HEADS_PREFIX};
use crate::repo::Repository;
use crate::revision;

/// one log row
pub struct LogEntry {
    pub id: ObjectId,
    pub commit: Commit,
}

/// first-parent history from a revision (default HEAD), newest first
pub fn log(repo: &Repository, rev: Option<&str>, max_count: Option<usize>) -> Result<Vec<LogEntry>> {
    let tip = match rev {
        Some(rev) => revision::rev_parse_commit(repo, rev)?,
        None => revision::rev_parse_commit(repo, "HEAD")?,
    };
    let ids = graph::walk_first_parent(repo, &tip, max_count)?;
    ids.into_iter()
        .map(|id| {
            Ok(LogEntry {
                commit: graph::load_commit(repo, &id)?,
                id,
            })
        })
        .collect()
}

/// commits reachable from a revision (or from every branch with `all`),
/// newest first across all parents
pub fn rev_list(
    repo: &Repository,
    rev: Option<&str>,
    all: bool,
    max_count: Option<usize>,
) -> Result<Vec<ObjectId>> {
    let mut tips = Vec::new();
    if all {
        for branch in refs::list_branches(repo)? {
            if let Some(id) = refs::resolve(repo, &format!("{HEADS_PREFIX}{branch}"))? {
                tips.push(graph::peel_to_commit(repo, &id)?);
            }
        }
    } else if let Some(rev) = rev {
        tips.push(revision::rev_parse_commit(repo, rev)?);
    } else {
        tips.push(revision::rev_parse_commit(repo, "HEAD")?);
    }
    let mut ids = graph::walk_topological(repo, &tips)?;
    if let Some(n) = max_count {
        ids.truncate(n);
    }
    Ok(ids)
}

/// reflog rows for display: (short id, label, message), newest first
pub fn reflog_entries(
    repo: &Repository,
    refname: &str,
    max_count: Option<usize>,
) -> Result<Vec<(String, String, String)>> {
    let entries = crate::reflog::read(repo, refname)?;
    let mut out = Vec::new();
    for (n, entry) in entries.iter().rev().enumerate() {
        if max_count.is_some_and(|max| n >= max) {
            break;
        }
        out.push((
            entry.new.short(),
            format!("{refname}@{{{n}}}"),
            entry.message.clone(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::add::add_path;
    use crate::ops::commit::{commit, CommitOutcome};
    use crate::repo::Repository;
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
    fn test_log_first_parent_newest_first() {
        let (_dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a", b"1", "c1");
        let c2 = commit_file(&repo, "a", b"2", "c2");

        let entries = log(&repo, None, None).unwrap();
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![c2, c1]);
        assert_eq!(entries[0].commit.subject(), "c2");

        let limited = log(&repo, None, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_rev_list_matches_log_for_linear() {
        let (_dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a", b"1", "c1");
        let c2 = commit_file(&repo, "a", b"2", "c2");
        assert_eq!(rev_list(&repo, None, false, None).unwrap(), vec![c2, c1]);
    }

    #[test]
    fn test_reflog_entries_newest_first() {
        let (_dir, repo) = test_repo();
        commit_file(&repo, "a", b"1", "c1");
        commit_file(&repo, "a", b"2", "c2");

        let rows = reflog_entries(&repo, "HEAD", None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, "HEAD@{0}");
        assert!(rows[0].2.contains("c2"));
        assert!(rows[1].2.contains("c1"));
    }
}
