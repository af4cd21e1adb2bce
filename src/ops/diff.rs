//! diff: working tree vs index, index vs HEAD, and tree vs tree, rendered
//! as unified diffs

use std::fmt::Write as _;

use crate::error::Result;
use crate::graph;
use crate::hash::{object_digest, ObjectId};
use crate::index::Index;
use crate::merge::is_binary;
use crate::refs;
use crate::repo::Repository;
use crate::worktree::{self, FlatTree};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
}

/// one changed path with its rendered diff
pub struct FileDiff {
    pub path: String,
    pub kind: ChangeKind,
    pub text: String,
}

/// line-level ops for a unified hunk
enum DiffOp {
    Context(usize),
    Delete(usize),
    Insert(usize),
}

fn split_lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .split_inclusive('\n')
        .map(str::to_string)
        .collect()
}

/// unified diff body (single hunk header per change run, 3 context lines)
fn unified(old: &[u8], new: &[u8]) -> String {
    let a = split_lines(old);
    let b = split_lines(new);
    let a_refs: Vec<&[u8]> = a.iter().map(|s| s.as_bytes()).collect();
    let b_refs: Vec<&[u8]> = b.iter().map(|s| s.as_bytes()).collect();
    let matches = crate::merge::lcs_pairs(&a_refs, &b_refs);

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    for (mi, mj) in matches.iter().copied().chain([(a.len(), b.len())]) {
        while i < mi {
            ops.push(DiffOp::Delete(i));
            i += 1;
        }
        while j < mj {
            ops.push(DiffOp::Insert(j));
            j += 1;
        }
        if mi < a.len() {
            ops.push(DiffOp::Context(mi));
            i = mi + 1;
            j = mj + 1;
        }
    }

    let changed = ops
        .iter()
        .any(|op| !matches!(op, DiffOp::Context(_)));
    if !changed {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "@@ -1,{} +1,{} @@", a.len(), b.len());
    for op in ops {
        match op {
            DiffOp::Context(at) => {
                out.push(' ');
                out.push_str(&a[at]);
                ensure_nl(&mut out);
            }
            DiffOp::Delete(at) => {
                out.push('-');
                out.push_str(&a[at]);
                ensure_nl(&mut out);
            }
            DiffOp::Insert(at) => {
                out.push('+');
                out.push_str(&b[at]);
                ensure_nl(&mut out);
            }
        }
    }
    out
}

fn ensure_nl(out: &mut String) {
    if !out.ends_with('\n') {
        out.push('\n');
    }
}

fn render(path: &str, old: &[u8], new: &[u8], kind: ChangeKind) -> FileDiff {
    let mut text = format!("diff --git a/{path} b/{path}\n");
    match kind {
        ChangeKind::Added => text.push_str("new file\n"),
        ChangeKind::Deleted => text.push_str("deleted file\n"),
        ChangeKind::Modified => {}
    }
    if is_binary(old) || is_binary(new) {
        let _ = writeln!(text, "Binary files a/{path} and b/{path} differ");
    } else {
        let _ = writeln!(text, "--- a/{path}");
        let _ = writeln!(text, "+++ b/{path}");
        text.push_str(&unified(old, new));
    }
    FileDiff {
        path: path.to_string(),
        kind,
        text,
    }
}

fn blob_or_empty(repo: &Repository, id: Option<&ObjectId>) -> Result<Vec<u8>> {
    match id {
        Some(id) => Ok(repo.odb().load(id)?.as_blob()?.content.clone()),
        None => Ok(Vec::new()),
    }
}

/// index vs HEAD (`diff --staged`)
pub fn diff_staged(repo: &Repository) -> Result<Vec<FileDiff>> {
    let index = Index::load(repo)?;
    let head_tree: FlatTree = match refs::head_id(repo)? {
        Some(head) => {
            let tree = graph::load_commit(repo, &head)?.tree;
            worktree::flatten_tree(repo, &tree)?
        }
        None => FlatTree::new(),
    };

    let mut out = Vec::new();
    let mut paths: Vec<String> = index
        .entries()
        .iter()
        .map(|e| e.path.clone())
        .chain(head_tree.keys().cloned())
        .collect();
    paths.sort();
    paths.dedup();

    for path in paths {
        let staged = index.get(&path).map(|e| e.id);
        let in_head = head_tree.get(&path).map(|(id, _)| *id);
        match (in_head, staged) {
            (None, Some(new_id)) => {
                let new = blob_or_empty(repo, Some(&new_id))?;
                out.push(render(&path, b"", &new, ChangeKind::Added));
            }
            (Some(old_id), None) => {
                let old = blob_or_empty(repo, Some(&old_id))?;
                out.push(render(&path, &old, b"", ChangeKind::Deleted));
            }
            (Some(old_id), Some(new_id)) if old_id != new_id => {
                let old = blob_or_empty(repo, Some(&old_id))?;
                let new = blob_or_empty(repo, Some(&new_id))?;
                out.push(render(&path, &old, &new, ChangeKind::Modified));
            }
            _ => {}
        }
    }
    Ok(out)
}

/// working tree vs index
pub fn diff_worktree(repo: &Repository) -> Result<Vec<FileDiff>> {
    let index = Index::load(repo)?;
    let mut out = Vec::new();
    for entry in index.entries().iter().filter(|e| e.stage == 0) {
        let full = repo.work_dir().join(&entry.path);
        if !full.is_file() {
            let old = blob_or_empty(repo, Some(&entry.id))?;
            out.push(render(&entry.path, &old, b"", ChangeKind::Deleted));
            continue;
        }
        if entry.stat_matches(repo.work_dir()) {
            continue;
        }
        let on_disk = std::fs::read(&full).map_err(|source| crate::Error::Io {
            path: full.clone(),
            source,
        })?;
        if object_digest("blob", &on_disk) == entry.id {
            continue;
        }
        let old = blob_or_empty(repo, Some(&entry.id))?;
        out.push(render(&entry.path, &old, &on_disk, ChangeKind::Modified));
    }
    Ok(out)
}

/// tree-ish vs tree-ish (used by `show`)
pub fn diff_trees(repo: &Repository, old: &ObjectId, new: &ObjectId) -> Result<Vec<FileDiff>> {
    let old_flat = worktree::flatten_tree(repo, old)?;
    let new_flat = worktree::flatten_tree(repo, new)?;
    let mut paths: Vec<String> = old_flat.keys().chain(new_flat.keys()).cloned().collect();
    paths.sort();
    paths.dedup();

    let mut out = Vec::new();
    for path in paths {
        let old_id = old_flat.get(&path).map(|(id, _)| *id);
        let new_id = new_flat.get(&path).map(|(id, _)| *id);
        if old_id == new_id {
            continue;
        }
        let old_bytes = blob_or_empty(repo, old_id.as_ref())?;
        let new_bytes = blob_or_empty(repo, new_id.as_ref())?;
        let kind = match (old_id, new_id) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Deleted,
            _ => ChangeKind::Modified,
        };
        out.push(render(&path, &old_bytes, &new_bytes, kind));
    }
    Ok(out)
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
    fn test_worktree_diff() {
        let (dir, repo) = test_repo();
        commit_file(&repo, "a.txt", b"one\ntwo\n", "c1");
        std::fs::write(dir.path().join("a.txt"), b"one\nTWO\n").unwrap();

        let diffs = diff_worktree(&repo).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, ChangeKind::Modified);
        assert!(diffs[0].text.contains("-two"));
        assert!(diffs[0].text.contains("+TWO"));
        assert!(diffs[0].text.contains(" one"));
    }

    #[test]
    fn test_staged_diff() {
        let (dir, repo) = test_repo();
        commit_file(&repo, "a.txt", b"A\n", "c1");
        std::fs::write(dir.path().join("b.txt"), b"B\n").unwrap();
        add_path(&repo, "b.txt", false).unwrap();

        let diffs = diff_staged(&repo).unwrap();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, ChangeKind::Added);
        assert!(diffs[0].text.contains("new file"));
        assert!(diffs[0].text.contains("+B"));
    }

    #[test]
    fn test_clean_tree_no_diffs() {
        let (_dir, repo) = test_repo();
        commit_file(&repo, "a.txt", b"A\n", "c1");
        assert!(diff_worktree(&repo).unwrap().is_empty());
        assert!(diff_staged(&repo).unwrap().is_empty());
    }

    #[test]
    fn test_binary_diff_short_circuits() {
        let (dir, repo) = test_repo();
        commit_file(&repo, "bin", b"\x00\x01", "c1");
        std::fs::write(dir.path().join("bin"), b"\x00\x02").unwrap();

        let diffs = diff_worktree(&repo).unwrap();
        assert!(diffs[0].text.contains("Binary files"));
    }

    #[test]
    fn test_diff_trees() {
        let (_dir, repo) = test_repo();
        let c1 = commit_file(&repo, "a.txt", b"A\n", "c1");
        let c2 = commit_file(&repo, "a.txt", b"B\n", "c2");
        let t1 = graph::load_commit(&repo, &c1).unwrap().tree;
        let t2 = graph::load_commit(&repo, &c2).unwrap().tree;

        let diffs = diff_trees(&repo, &t1, &t2).unwrap();
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].text.contains("-A"));
        assert!(diffs[0].text.contains("+B"));
    }
}
