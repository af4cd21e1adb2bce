//! working tree / index / HEAD classification

use std::collections::BTreeMap;

use walkdir::WalkDir;

use crate::error::Result;
use crate::graph;
use crate::hash::{object_digest, ObjectId};
use crate::ignore;
use crate::index::Index;
use crate::refs;
use crate::repo::Repository;
use crate::worktree::{self, FlatTree};

/// snapshot of the repository state, all path lists sorted
#[derive(Debug, Default)]
pub struct Status {
    pub branch: Option<String>,
    pub head: Option<ObjectId>,
    pub staged_new: Vec<String>,
    pub staged_modified: Vec<String>,
    pub staged_deleted: Vec<String>,
    pub unstaged: Vec<String>,
    pub deleted: Vec<String>,
    pub untracked: Vec<String>,
    pub unmerged: Vec<String>,
}

impl Status {
    pub fn is_clean(&self) -> bool {
        self.staged_new.is_empty()
            && self.staged_modified.is_empty()
            && self.staged_deleted.is_empty()
            && self.unstaged.is_empty()
            && self.deleted.is_empty()
            && self.untracked.is_empty()
            && self.unmerged.is_empty()
    }
}

/// blob ids of working-tree files (ignored paths skipped).
///
/// files whose stat matches their index entry reuse the staged id instead
/// of re-digesting; `MINGIT_PARANOID=1` defeats that cache.
fn working_tree_ids(repo: &Repository, index: &Index) -> Result<BTreeMap<String, ObjectId>> {
    let matcher = ignore::load(repo);
    let mut out = BTreeMap::new();
    for entry in WalkDir::new(repo.work_dir()).sort_by_file_name() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() && !entry.file_type().is_symlink() {
            continue;
        }
        let Some(rel) = repo.relative_path(entry.path()) else {
            continue;
        };
        if rel == ".git" || rel.starts_with(".git/") || matcher.is_ignored(&rel, false) {
            continue;
        }
        if let Some(staged) = index.get(&rel) {
            if staged.stat_matches(repo.work_dir()) {
                out.insert(rel, staged.id);
                continue;
            }
        }
        let content = if entry.file_type().is_symlink() {
            match std::fs::read_link(entry.path()) {
                Ok(target) => target.to_string_lossy().into_owned().into_bytes(),
                Err(_) => continue,
            }
        } else {
            match std::fs::read(entry.path()) {
                Ok(content) => content,
                Err(_) => continue,
            }
        };
        out.insert(rel, object_digest("blob", &content));
    }
    Ok(out)
}

/// compute full status: index vs HEAD (staged) and working tree vs index
pub fn status(repo: &Repository) -> Result<Status> {
    let index = Index::load(repo)?;
    let head = refs::head_id(repo)?;
    let branch = refs::current_branch(repo)?;

    let head_tree: FlatTree = match head {
        Some(head_id) => {
            let tree = graph::load_commit(repo, &head_id)?.tree;
            worktree::flatten_tree(repo, &tree)?
        }
        None => FlatTree::new(),
    };
    let working = working_tree_ids(repo, &index)?;

    let mut st = Status {
        branch,
        head,
        unmerged: index.unmerged_paths(),
        ..Status::default()
    };

    for entry in index.entries().iter().filter(|e| e.stage == 0) {
        match head_tree.get(&entry.path) {
            None => st.staged_new.push(entry.path.clone()),
            Some((head_id, _)) if *head_id != entry.id => {
                st.staged_modified.push(entry.path.clone())
            }
            Some(_) => {}
        }
        match working.get(&entry.path) {
            None => st.deleted.push(entry.path.clone()),
            Some(work_id) if *work_id != entry.id => st.unstaged.push(entry.path.clone()),
            Some(_) => {}
        }
    }
    for path in head_tree.keys() {
        if index.get(path).is_none() && !st.unmerged.contains(path) {
            st.staged_deleted.push(path.clone());
        }
    }
    for path in working.keys() {
        if index.get(path).is_none()
            && !head_tree.contains_key(path)
            && !st.unmerged.contains(path)
        {
            st.untracked.push(path.clone());
        }
    }

    for list in [
        &mut st.staged_new,
        &mut st.staged_modified,
        &mut st.staged_deleted,
        &mut st.unstaged,
        &mut st.deleted,
        &mut st.untracked,
        &mut st.unmerged,
    ] {
        list.sort();
    }
    Ok(st)
}

/// true when anything differs between working tree, index and HEAD;
/// merge/cherry-pick/rebase refuse to start on a dirty tree
pub fn is_dirty(repo: &Repository) -> Result<bool> {
    Ok(!status(repo)?.is_clean())
}
