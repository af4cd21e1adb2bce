//! tree materializer: build trees from the index, flatten trees, and check
//! trees out into the working directory

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{object_digest, ObjectId};
use crate::index::{Index, IndexEntry};
use crate::object::{FileMode, Object, Tree, TreeEntry};
use crate::repo::Repository;

/// a flattened tree: path -> (blob id, mode)
pub type FlatTree = BTreeMap<String, (ObjectId, u32)>;

enum Node {
    File { id: ObjectId, mode: u32 },
    Dir(BTreeMap<String, Node>),
}

/// build (and store) the tree for the index; returns the root tree id.
///
/// subtrees are cached by content so identical directories hash once.
pub fn tree_from_index(repo: &Repository, index: &Index) -> Result<ObjectId> {
    if index.has_conflicts() {
        return Err(Error::MergeConflict(index.unmerged_paths()));
    }
    let mut root = BTreeMap::new();
    for entry in index.entries() {
        insert_path(&mut root, &entry.path, entry.id, entry.mode)?;
    }
    let mut cache = HashMap::new();
    store_tree(repo, &root, &mut cache)
}

fn insert_path(root: &mut BTreeMap<String, Node>, path: &str, id: ObjectId, mode: u32) -> Result<()> {
    let mut parts = path.split('/').peekable();
    let mut current = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            current.insert(part.to_string(), Node::File { id, mode });
        } else {
            let node = current
                .entry(part.to_string())
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            current = match node {
                Node::Dir(children) => children,
                Node::File { .. } => {
                    return Err(Error::MalformedIndex(format!(
                        "path {path} conflicts with a staged file"
                    )))
                }
            };
        }
    }
    Ok(())
}

fn store_tree(
    repo: &Repository,
    nodes: &BTreeMap<String, Node>,
    cache: &mut HashMap<Vec<u8>, ObjectId>,
) -> Result<ObjectId> {
    let mut entries = Vec::with_capacity(nodes.len());
    for (name, node) in nodes {
        match node {
            Node::File { id, mode } => {
                entries.push(TreeEntry::new(FileMode::from_u32(*mode)?, name.clone(), *id));
            }
            Node::Dir(children) => {
                let id = store_tree(repo, children, cache)?;
                entries.push(TreeEntry::new(FileMode::Directory, name.clone(), id));
            }
        }
    }
    let tree = Tree::from_entries(entries);
    if let Some(id) = cache.get(tree.content()) {
        return Ok(*id);
    }
    let id = repo.odb().store(&Object::Tree(tree.clone()))?;
    cache.insert(tree.content().to_vec(), id);
    Ok(id)
}

/// flatten a tree to path -> (blob id, mode); directories recurse
pub fn flatten_tree(repo: &Repository, tree_id: &ObjectId) -> Result<FlatTree> {
    let mut out = BTreeMap::new();
    flatten_into(repo, tree_id, "", &mut out)?;
    Ok(out)
}

fn flatten_into(
    repo: &Repository,
    tree_id: &ObjectId,
    prefix: &str,
    out: &mut FlatTree,
) -> Result<()> {
    let object = repo.odb().load(tree_id)?;
    let tree = object.as_tree()?;
    for entry in tree.entries() {
        let path = if prefix.is_empty() {
            entry.name.clone()
        } else {
            format!("{prefix}/{}", entry.name)
        };
        if entry.mode.is_dir() {
            flatten_into(repo, &entry.id, &path, out)?;
        } else {
            out.insert(path, (entry.id, entry.mode.as_u32()));
        }
    }
    Ok(())
}

/// blob content at a path inside a tree, or None when absent
pub fn read_blob_from_tree(
    repo: &Repository,
    tree_id: &ObjectId,
    path: &str,
) -> Result<Option<Vec<u8>>> {
    let mut current = *tree_id;
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    for (i, part) in parts.iter().enumerate() {
        let object = repo.odb().load(&current)?;
        let tree = object.as_tree()?;
        let Some(entry) = tree.get(part) else {
            return Ok(None);
        };
        if i == parts.len() - 1 {
            if entry.mode.is_dir() {
                return Ok(None);
            }
            let blob = repo.odb().load(&entry.id)?;
            return Ok(Some(blob.as_blob()?.content.clone()));
        }
        if !entry.mode.is_dir() {
            return Ok(None);
        }
        current = entry.id;
    }
    Ok(None)
}

/// how checkout treats the existing working tree
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutPolicy {
    /// refuse to overwrite locally-modified tracked files
    Safe,
    /// overwrite unconditionally
    Force,
}

/// write a file into the working tree atomically (temp + rename), honoring
/// the executable bit; symlink entries become platform symlinks
pub fn materialize_file(full: &Path, content: &[u8], mode: u32) -> Result<()> {
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    if mode == 0o120000 {
        let target = String::from_utf8_lossy(content).to_string();
        if full.exists() || fs::symlink_metadata(full).is_ok() {
            fs::remove_file(full).with_path(full)?;
        }
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, full).with_path(full)?;
        return Ok(());
    }
    let dir = full.parent().expect("file path has a parent");
    let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, content).with_path(&tmp)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perm = if mode == 0o100755 { 0o755 } else { 0o644 };
        fs::set_permissions(&tmp, fs::Permissions::from_mode(perm)).with_path(&tmp)?;
    }
    fs::rename(&tmp, full).with_path(full)?;
    Ok(())
}

/// check a tree out into the working directory and rewrite the index to
/// mirror it.
///
/// under `Safe`, tracked files whose content differs from the index refuse
/// the checkout before anything is touched.
pub fn checkout_tree(repo: &Repository, tree_id: &ObjectId, policy: CheckoutPolicy) -> Result<()> {
    let target = flatten_tree(repo, tree_id)?;
    let mut index = Index::load(repo)?;

    if policy == CheckoutPolicy::Safe {
        for entry in index.entries() {
            let full = repo.work_dir().join(&entry.path);
            if !full.is_file() {
                continue;
            }
            if entry.stat_matches(repo.work_dir()) {
                continue;
            }
            let on_disk = fs::read(&full).with_path(&full)?;
            if object_digest("blob", &on_disk) != entry.id {
                return Err(Error::DirtyWorkingTree);
            }
        }
    }

    // drop files tracked now but absent from the target tree
    for entry in index.entries().to_vec() {
        if target.contains_key(&entry.path) {
            continue;
        }
        let full = repo.work_dir().join(&entry.path);
        if fs::symlink_metadata(&full).is_ok() {
            fs::remove_file(&full).with_path(&full)?;
            remove_empty_parents(repo.work_dir(), &full);
        }
    }

    index.clear();
    for (path, (id, mode)) in &target {
        let blob = repo.odb().load(id)?;
        let content = blob.as_blob()?.content.clone();
        let full = repo.work_dir().join(path);
        materialize_file(&full, &content, *mode)?;
        let entry = if *mode == 0o120000 {
            IndexEntry::bare(path.clone(), *id, *mode)
        } else {
            IndexEntry::from_file(&full, path.clone(), *id)?
        };
        index.upsert(entry);
    }
    index.save(repo)?;
    Ok(())
}

/// remove now-empty directories between a deleted file and the repo root
pub fn remove_empty_parents(work_dir: &Path, deleted: &Path) {
    let mut dir = deleted.parent().map(Path::to_path_buf);
    while let Some(current) = dir {
        if current == work_dir {
            break;
        }
        match fs::read_dir(&current) {
            Ok(mut it) => {
                if it.next().is_some() {
                    break;
                }
            }
            Err(_) => break,
        }
        let _ = fs::remove_dir(&current);
        dir = current.parent().map(Path::to_path_buf);
    }
}

/// rebuild the index from a tree without touching the working directory
pub fn index_from_tree(repo: &Repository, tree_id: &ObjectId) -> Result<Index> {
    let mut index = Index::default();
    for (path, (id, mode)) in flatten_tree(repo, tree_id)? {
        index.upsert(IndexEntry::bare(path, id, mode));
    }
    Ok(index)
}
