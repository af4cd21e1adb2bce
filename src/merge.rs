//! three-way merge: tree-level classification plus a line-based text merge
//! that emits conflict markers per hunk

use std::collections::BTreeMap;

use crate::error::Result;
use crate::hash::ObjectId;
use crate::index::{Index, IndexEntry};
use crate::object::{Blob, Object};
use crate::repo::Repository;
use crate::worktree::{self, FlatTree};

/// binary heuristic: NUL byte or a dense non-printable prefix
pub fn is_binary(data: &[u8]) -> bool {
    let probe = &data[..data.len().min(8000)];
    if probe.contains(&0) {
        return true;
    }
    let non_printable = probe
        .iter()
        .filter(|&&b| b < 32 && !matches!(b, b'\t' | b'\n' | b'\r'))
        .count();
    non_printable > probe.len() / 4
}

/// split into lines, keeping terminators
fn lines(data: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, &b) in data.iter().enumerate() {
        if b == b'\n' {
            out.push(&data[start..=i]);
            start = i + 1;
        }
    }
    if start < data.len() {
        out.push(&data[start..]);
    }
    out
}

/// longest common subsequence match: pairs (a index, b index), monotone
pub(crate) fn lcs_pairs(a: &[&[u8]], b: &[&[u8]]) -> Vec<(usize, usize)> {
    let n = a.len();
    let m = b.len();
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let at = |i: usize, j: usize| i * (m + 1) + j;
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[at(i, j)] = if a[i] == b[j] {
                table[at(i + 1, j + 1)] + 1
            } else {
                table[at(i + 1, j)].max(table[at(i, j + 1)])
            };
        }
    }
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[at(i + 1, j)] >= table[at(i, j + 1)] {
            i += 1;
        } else {
            j += 1;
        }
    }
    pairs
}

/// outcome of a text-level merge
pub struct TextMerge {
    pub content: Vec<u8>,
    pub conflicted: bool,
}

/// diff3-style merge of ours/theirs against base.
///
/// regions where only one side changed take that side; regions where both
/// changed identically collapse; anything else becomes a conflict hunk
/// bracketed by `<<<<<<< ours` / `=======` / `>>>>>>> theirs`.
pub fn merge_text(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    label_ours: &str,
    label_theirs: &str,
) -> TextMerge {
    let base_lines = lines(base);
    let ours_lines = lines(ours);
    let theirs_lines = lines(theirs);

    let to_ours: BTreeMap<usize, usize> = lcs_pairs(&base_lines, &ours_lines).into_iter().collect();
    let to_theirs: BTreeMap<usize, usize> =
        lcs_pairs(&base_lines, &theirs_lines).into_iter().collect();

    let mut content = Vec::new();
    let mut conflicted = false;
    let (mut bi, mut oi, mut ti) = (0usize, 0usize, 0usize);

    loop {
        // next base line anchored in both sides, respecting current positions
        let anchor = (bi..base_lines.len()).find_map(|i| {
            let o = *to_ours.get(&i)?;
            let t = *to_theirs.get(&i)?;
            (o >= oi && t >= ti).then_some((i, o, t))
        });
        let (base_end, ours_end, theirs_end) = match anchor {
            Some((b, o, t)) => (b, o, t),
            None => (base_lines.len(), ours_lines.len(), theirs_lines.len()),
        };

        let base_region = &base_lines[bi..base_end];
        let ours_region = &ours_lines[oi..ours_end];
        let theirs_region = &theirs_lines[ti..theirs_end];

        if ours_region == theirs_region {
            for line in ours_region {
                content.extend_from_slice(line);
            }
        } else if ours_region == base_region {
            for line in theirs_region {
                content.extend_from_slice(line);
            }
        } else if theirs_region == base_region {
            for line in ours_region {
                content.extend_from_slice(line);
            }
        } else {
            conflicted = true;
            content.extend_from_slice(format!("<<<<<<< {label_ours}\n").as_bytes());
            for line in ours_region {
                content.extend_from_slice(line);
            }
            ensure_newline(&mut content);
            content.extend_from_slice(b"=======\n");
            for line in theirs_region {
                content.extend_from_slice(line);
            }
            ensure_newline(&mut content);
            content.extend_from_slice(format!(">>>>>>> {label_theirs}\n").as_bytes());
        }

        if anchor.is_none() {
            break;
        }
        content.extend_from_slice(base_lines[base_end]);
        bi = base_end + 1;
        oi = ours_end + 1;
        ti = theirs_end + 1;
    }

    TextMerge {
        content,
        conflicted,
    }
}

fn ensure_newline(out: &mut Vec<u8>) {
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
}

/// a merged file ready for the working tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedFile {
    pub content: Vec<u8>,
    pub mode: u32,
}

/// per-path result of a tree merge
pub enum PathOutcome {
    /// cleanly merged: write this content, or delete when None
    Clean(Option<MergedFile>),
    /// conflicted: `on_disk` carries markers (text) or the surviving side
    /// (binary); the index gets stages 1/2/3
    Conflict {
        on_disk: MergedFile,
        binary: bool,
        base: Option<(ObjectId, u32)>,
        ours: Option<(ObjectId, u32)>,
        theirs: Option<(ObjectId, u32)>,
    },
}

/// tree-level merge result
pub struct TreeMerge {
    pub outcomes: BTreeMap<String, PathOutcome>,
    pub conflicts: Vec<String>,
    pub binary_conflicts: Vec<String>,
}

impl TreeMerge {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.binary_conflicts.is_empty()
    }

    /// all conflicted paths, sorted
    pub fn conflict_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .conflicts
            .iter()
            .chain(self.binary_conflicts.iter())
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

fn blob_content(repo: &Repository, id: &ObjectId) -> Result<Vec<u8>> {
    Ok(repo.odb().load(id)?.as_blob()?.content.clone())
}

/// classify and merge every path in the union of three trees.
///
/// `None` trees stand for the empty tree (root commits, unborn branches).
pub fn merge_trees(
    repo: &Repository,
    base_tree: Option<&ObjectId>,
    ours_tree: Option<&ObjectId>,
    theirs_tree: Option<&ObjectId>,
    label_ours: &str,
    label_theirs: &str,
) -> Result<TreeMerge> {
    let empty = FlatTree::new();
    let base = match base_tree {
        Some(id) => worktree::flatten_tree(repo, id)?,
        None => empty.clone(),
    };
    let ours = match ours_tree {
        Some(id) => worktree::flatten_tree(repo, id)?,
        None => empty.clone(),
    };
    let theirs = match theirs_tree {
        Some(id) => worktree::flatten_tree(repo, id)?,
        None => empty,
    };

    let mut paths: Vec<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    paths.sort();
    paths.dedup();

    let mut outcomes = BTreeMap::new();
    let mut conflicts = Vec::new();
    let mut binary_conflicts = Vec::new();

    for path in paths {
        let b = base.get(path).copied();
        let o = ours.get(path).copied();
        let t = theirs.get(path).copied();

        // trivial cases resolve on ids alone
        let trivial: Option<Option<(ObjectId, u32)>> = if o == t {
            Some(o)
        } else if b == o {
            Some(t)
        } else if b == t {
            Some(o)
        } else {
            None
        };
        if let Some(keep) = trivial {
            let outcome = match keep {
                Some((id, mode)) => Some(MergedFile {
                    content: blob_content(repo, &id)?,
                    mode,
                }),
                None => None,
            };
            outcomes.insert(path.clone(), PathOutcome::Clean(outcome));
            continue;
        }

        // both sides changed: try a content merge
        let base_bytes = match b {
            Some((id, _)) => blob_content(repo, &id)?,
            None => Vec::new(),
        };
        let ours_bytes = match o {
            Some((id, _)) => Some(blob_content(repo, &id)?),
            None => None,
        };
        let theirs_bytes = match t {
            Some((id, _)) => Some(blob_content(repo, &id)?),
            None => None,
        };
        let mode = o.or(t).map(|(_, m)| m).unwrap_or(0o100644);

        let binary = ours_bytes.as_deref().is_some_and(is_binary)
            || theirs_bytes.as_deref().is_some_and(is_binary)
            || is_binary(&base_bytes);
        if binary {
            // binary conflict: one side stays on disk, the path is reported
            let on_disk = ours_bytes
                .clone()
                .or_else(|| theirs_bytes.clone())
                .unwrap_or_default();
            binary_conflicts.push(path.clone());
            outcomes.insert(
                path.clone(),
                PathOutcome::Conflict {
                    on_disk: MergedFile {
                        content: on_disk,
                        mode,
                    },
                    binary: true,
                    base: b,
                    ours: o,
                    theirs: t,
                },
            );
            continue;
        }

        let merged = merge_text(
            &base_bytes,
            ours_bytes.as_deref().unwrap_or(b""),
            theirs_bytes.as_deref().unwrap_or(b""),
            label_ours,
            label_theirs,
        );
        if merged.conflicted {
            conflicts.push(path.clone());
            outcomes.insert(
                path.clone(),
                PathOutcome::Conflict {
                    on_disk: MergedFile {
                        content: merged.content,
                        mode,
                    },
                    binary: false,
                    base: b,
                    ours: o,
                    theirs: t,
                },
            );
        } else {
            outcomes.insert(
                path.clone(),
                PathOutcome::Clean(Some(MergedFile {
                    content: merged.content,
                    mode,
                })),
            );
        }
    }

    Ok(TreeMerge {
        outcomes,
        conflicts,
        binary_conflicts,
    })
}

/// write a tree merge into the working directory and index.
///
/// clean paths get stage-0 entries (their blobs stored); conflicted paths
/// get marker files on disk and stage-1/2/3 index entries.
pub fn apply_merge(repo: &Repository, merge: &TreeMerge) -> Result<()> {
    let mut index = Index::load(repo)?;
    for (path, outcome) in &merge.outcomes {
        let full = repo.work_dir().join(path);
        match outcome {
            PathOutcome::Clean(None) => {
                if std::fs::symlink_metadata(&full).is_ok() {
                    std::fs::remove_file(&full).map_err(|source| crate::Error::Io {
                        path: full.clone(),
                        source,
                    })?;
                    worktree::remove_empty_parents(repo.work_dir(), &full);
                }
                index.remove(path);
            }
            PathOutcome::Clean(Some(file)) => {
                worktree::materialize_file(&full, &file.content, file.mode)?;
                let id = repo
                    .odb()
                    .store(&Object::Blob(Blob::new(file.content.clone())))?;
                index.upsert(IndexEntry::from_file(&full, path.clone(), id)?);
            }
            PathOutcome::Conflict {
                on_disk,
                base,
                ours,
                theirs,
                ..
            } => {
                worktree::materialize_file(&full, &on_disk.content, on_disk.mode)?;
                index.set_conflict(path, *base, *ours, *theirs);
            }
        }
    }
    index.save(repo)?;
    Ok(())
}
