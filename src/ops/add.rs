//! staging operations: add, rm, restore

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::ignore;
use crate::index::{Index, IndexEntry};
use crate::object::{Blob, Object};
use crate::refs;
use crate::repo::Repository;
use crate::revision;
use crate::worktree;

/// stage a file or directory; ignored paths are skipped unless forced.
/// returns the staged paths.
pub fn add_path(repo: &Repository, path: &str, force: bool) -> Result<Vec<String>> {
    let full = repo.safe_path(path)?;
    let matcher = ignore::load(repo);
    let mut index = Index::load(repo)?;
    let mut added = Vec::new();

    if full.is_file() || full.is_symlink() {
        let rel = repo
            .relative_path(&full)
            .ok_or_else(|| Error::Config(format!("path outside repository: {path}")))?;
        if force || !matcher.is_ignored(&rel, false) {
            stage_file(repo, &mut index, &full, &rel)?;
            added.push(rel);
        }
    } else if full.is_dir() {
        for entry in WalkDir::new(&full).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Config(format!("walk {path}: {e}")))?;
            if !entry.file_type().is_file() && !entry.file_type().is_symlink() {
                continue;
            }
            let Some(rel) = repo.relative_path(entry.path()) else {
                continue;
            };
            if rel.starts_with(".git/") {
                continue;
            }
            if !force && matcher.is_ignored(&rel, false) {
                continue;
            }
            stage_file(repo, &mut index, entry.path(), &rel)?;
            added.push(rel);
        }
    } else {
        return Err(Error::Io {
            path: full,
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }

    index.save(repo)?;
    Ok(added)
}

/// hash a working file into the odb and upsert its index entry
fn stage_file(repo: &Repository, index: &mut Index, full: &Path, rel: &str) -> Result<()> {
    let meta = std::fs::symlink_metadata(full).with_path(full)?;
    let content = if meta.file_type().is_symlink() {
        std::fs::read_link(full)
            .with_path(full)?
            .to_string_lossy()
            .into_owned()
            .into_bytes()
    } else {
        std::fs::read(full).with_path(full)?
    };
    let id = repo.odb().store(&Object::Blob(Blob::new(content)))?;
    // staging a resolved file collapses any conflict stages
    index.remove(rel);
    index.upsert(IndexEntry::from_file(full, rel, id)?);
    Ok(())
}

/// remove paths from the index, and from the working tree unless `cached`.
/// directories need `recursive`. returns the removed paths.
pub fn rm_paths(
    repo: &Repository,
    paths: &[String],
    cached: bool,
    recursive: bool,
) -> Result<Vec<String>> {
    let mut index = Index::load(repo)?;
    let mut removed = Vec::new();
    for path in paths {
        let full = repo.safe_path(path)?;
        if full.is_dir() {
            if !recursive {
                return Err(Error::Config(format!(
                    "'{path}' is a directory (use recursive removal)"
                )));
            }
            let tracked: Vec<String> = index
                .entries()
                .iter()
                .map(|e| e.path.clone())
                .filter(|p| p == path || p.starts_with(&format!("{path}/")))
                .collect();
            for tracked_path in tracked {
                index.remove(&tracked_path);
                if !cached {
                    let file = repo.work_dir().join(&tracked_path);
                    if file.exists() {
                        std::fs::remove_file(&file).with_path(&file)?;
                    }
                }
                removed.push(tracked_path);
            }
            if !cached {
                let _ = std::fs::remove_dir(&full);
            }
        } else if index.remove(path) {
            if !cached && full.exists() {
                std::fs::remove_file(&full).with_path(&full)?;
            }
            removed.push(path.clone());
        } else {
            return Err(Error::Config(format!("'{path}' is not in the index")));
        }
    }
    index.save(repo)?;
    Ok(removed)
}

/// restore working-tree files from the index (or a source commit); with
/// `staged`, reset index entries to HEAD instead
pub fn restore(
    repo: &Repository,
    paths: &[String],
    staged: bool,
    source: Option<&str>,
) -> Result<()> {
    let mut index = Index::load(repo)?;

    let source_tree = match source {
        Some(rev) => {
            let commit_id = revision::rev_parse_commit(repo, rev)?;
            Some(crate::graph::load_commit(repo, &commit_id)?.tree)
        }
        None => match refs::head_id(repo)? {
            Some(head) => Some(crate::graph::load_commit(repo, &head)?.tree),
            None => None,
        },
    };

    if staged {
        for path in paths {
            let from_tree = match &source_tree {
                Some(tree) => worktree::read_blob_from_tree(repo, tree, path)?,
                None => None,
            };
            match from_tree {
                Some(content) => {
                    let id = repo.odb().store(&Object::Blob(Blob::new(content)))?;
                    index.upsert(IndexEntry::bare(path.clone(), id, 0o100644));
                }
                None => {
                    index.remove(path);
                }
            }
        }
        index.save(repo)?;
        return Ok(());
    }

    for path in paths {
        let full = repo.safe_path(path)?;
        // index wins; fall back to the source tree
        let blob = match index.get(path) {
            Some(entry) => Some((repo.odb().load(&entry.id)?.as_blob()?.content.clone(), entry.mode)),
            None => match &source_tree {
                Some(tree) => worktree::read_blob_from_tree(repo, tree, path)?
                    .map(|content| (content, 0o100644)),
                None => None,
            },
        };
        if let Some((content, mode)) = blob {
            worktree::materialize_file(&full, &content, mode)?;
        }
    }
    Ok(())
}
