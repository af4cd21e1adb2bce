use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{is_full_hex, ObjectId};
use crate::reflog;
use crate::repo::Repository;

pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";
pub const REMOTES_PREFIX: &str = "refs/remotes/";
pub const STASH_REF: &str = "refs/stash";

/// symbolic chains longer than this are treated as cycles
const MAX_SYMREF_DEPTH: u32 = 5;

/// HEAD state: attached to a branch or detached at a commit
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadState {
    Symbolic(String),
    Detached(ObjectId),
}

fn ref_path(repo: &Repository, refname: &str) -> PathBuf {
    repo.git_dir().join(refname)
}

/// read HEAD; errors if the file is missing or unparseable
pub fn read_head(repo: &Repository) -> Result<HeadState> {
    let path = repo.git_dir().join("HEAD");
    let raw = fs::read_to_string(&path).with_path(&path)?;
    let raw = raw.trim();
    if let Some(target) = raw.strip_prefix("ref: ") {
        return Ok(HeadState::Symbolic(target.trim().to_string()));
    }
    if is_full_hex(raw) {
        return Ok(HeadState::Detached(ObjectId::from_hex(raw)?));
    }
    Err(Error::MalformedRef(format!("HEAD: {raw}")))
}

/// commit HEAD points at, or None on an unborn branch
pub fn head_id(repo: &Repository) -> Result<Option<ObjectId>> {
    match read_head(repo)? {
        HeadState::Detached(id) => Ok(Some(id)),
        HeadState::Symbolic(refname) => resolve(repo, &refname),
    }
}

/// current branch name (e.g. "main"), or None when detached
pub fn current_branch(repo: &Repository) -> Result<Option<String>> {
    match read_head(repo)? {
        HeadState::Symbolic(refname) => Ok(refname
            .strip_prefix(HEADS_PREFIX)
            .map(|name| name.to_string())),
        HeadState::Detached(_) => Ok(None),
    }
}

/// re-point HEAD and append a HEAD reflog entry.
///
/// all attached/detached transitions go through here.
pub fn update_head(repo: &Repository, new: &HeadState, message: &str) -> Result<()> {
    let old = head_id(repo)?.unwrap_or(ObjectId::ZERO);
    let content = match new {
        HeadState::Symbolic(refname) => {
            if !refname.starts_with("refs/") {
                return Err(Error::MalformedRef(format!(
                    "symbolic HEAD target must be under refs/: {refname}"
                )));
            }
            format!("ref: {refname}\n")
        }
        HeadState::Detached(id) => format!("{id}\n"),
    };
    let path = repo.git_dir().join("HEAD");
    let tmp = repo.git_dir().join(format!(".tmp-{}", uuid::Uuid::new_v4()));
    fs::write(&tmp, content).with_path(&tmp)?;
    fs::rename(&tmp, &path).with_path(&path)?;

    let new_id = match new {
        HeadState::Detached(id) => Some(*id),
        HeadState::Symbolic(refname) => resolve(repo, refname)?,
    };
    reflog::append(repo, "HEAD", &old, &new_id.unwrap_or(ObjectId::ZERO), message)?;
    Ok(())
}

/// parse packed-refs: `sha refname` lines, `^sha` peeled lines ignored,
/// `#` comments, blanks
fn read_packed_refs(repo: &Repository) -> HashMap<String, ObjectId> {
    let mut result = HashMap::new();
    let Ok(raw) = fs::read_to_string(repo.git_dir().join("packed-refs")) else {
        return result;
    };
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let Some((sha, refname)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        if let Ok(id) = ObjectId::from_hex(sha.trim()) {
            result.insert(refname.trim().to_string(), id);
        }
    }
    result
}

/// resolve a refname to an object id. loose wins over packed-refs;
/// symbolic chains are followed up to a small depth bound.
pub fn resolve(repo: &Repository, refname: &str) -> Result<Option<ObjectId>> {
    resolve_depth(repo, refname, 0)
}

fn resolve_depth(repo: &Repository, refname: &str, depth: u32) -> Result<Option<ObjectId>> {
    if depth > MAX_SYMREF_DEPTH {
        return Err(Error::MalformedRef(format!(
            "symbolic ref chain too deep at {refname}"
        )));
    }
    let path = ref_path(repo, refname);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(read_packed_refs(repo).get(refname).copied());
        }
        Err(e) => return Err(Error::Io { path, source: e }),
    };
    let content = content.trim();
    if let Some(target) = content.strip_prefix("ref: ") {
        return resolve_depth(repo, target.trim(), depth + 1);
    }
    if is_full_hex(content) {
        return Ok(Some(ObjectId::from_hex(content)?));
    }
    Err(Error::MalformedRef(format!("{refname}: {content}")))
}

pub fn exists(repo: &Repository, refname: &str) -> bool {
    ref_path(repo, refname).is_file() || read_packed_refs(repo).contains_key(refname)
}

/// exclusive lock on a ref, released (and deleted) on drop unless committed
struct RefLock {
    lock_path: PathBuf,
    committed: bool,
}

impl RefLock {
    fn acquire(repo: &Repository, refname: &str) -> Result<Self> {
        let target = ref_path(repo, refname);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let lock_path = repo.git_dir().join(format!("{refname}.lock"));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => Ok(Self {
                lock_path,
                committed: false,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::LockHeld(lock_path))
            }
            Err(e) => Err(Error::Io {
                path: lock_path,
                source: e,
            }),
        }
    }

    /// write the new value into the lock file and rename it over the ref
    fn commit(mut self, target: &PathBuf, id: &ObjectId) -> Result<()> {
        fs::write(&self.lock_path, format!("{id}\n")).with_path(&self.lock_path)?;
        fs::rename(&self.lock_path, target).with_path(target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

/// atomically update a ref, with optional compare-and-swap on the old value.
///
/// the reflog entries for the ref (and for HEAD when HEAD points at it) are
/// appended inside the critical section.
pub fn update_ref(
    repo: &Repository,
    refname: &str,
    new: &ObjectId,
    old: Option<&ObjectId>,
    message: &str,
) -> Result<()> {
    let lock = RefLock::acquire(repo, refname)?;

    let current = resolve(repo, refname)?;
    if let Some(expected) = old {
        if current != Some(*expected) {
            return Err(Error::RefUpdateRejected {
                refname: refname.to_string(),
                reason: match current {
                    Some(actual) => format!("expected {expected}, found {actual}"),
                    None => format!("expected {expected}, found nothing"),
                },
            });
        }
    }

    let target = ref_path(repo, refname);
    lock.commit(&target, new)?;

    let old_id = current.unwrap_or(ObjectId::ZERO);
    reflog::append(repo, refname, &old_id, new, message)?;
    if let Ok(HeadState::Symbolic(head_target)) = read_head(repo) {
        if head_target == refname {
            reflog::append(repo, "HEAD", &old_id, new, message)?;
        }
    }
    Ok(())
}

/// delete a loose ref (branches, tags, stash)
pub fn delete_ref(repo: &Repository, refname: &str) -> Result<()> {
    let path = ref_path(repo, refname);
    fs::remove_file(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::MalformedRef(format!("no such ref: {refname}"))
        } else {
            Error::Io { path, source: e }
        }
    })
}

/// full refnames under a prefix (e.g. "refs/heads/"), loose + packed, sorted
pub fn list_with_prefix(repo: &Repository, prefix: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let dir = repo.git_dir().join(prefix.trim_end_matches('/'));
    if dir.is_dir() {
        collect_loose(&dir, prefix.trim_end_matches('/'), &mut names)?;
    }
    for refname in read_packed_refs(repo).keys() {
        if refname.starts_with(prefix) && !names.contains(refname) {
            names.push(refname.clone());
        }
    }
    names.sort();
    Ok(names)
}

fn collect_loose(dir: &PathBuf, prefix: &str, names: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_path(dir)? {
        let entry = entry.with_path(dir)?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".lock") || name.starts_with('.') {
            continue;
        }
        let full = format!("{prefix}/{name}");
        if path.is_dir() {
            collect_loose(&path, &full, names)?;
        } else {
            names.push(full);
        }
    }
    Ok(())
}

/// branch names (refs/heads/*), sorted
pub fn list_branches(repo: &Repository) -> Result<Vec<String>> {
    Ok(list_with_prefix(repo, HEADS_PREFIX)?
        .into_iter()
        .filter_map(|r| r.strip_prefix(HEADS_PREFIX).map(str::to_string))
        .collect())
}

/// tag names (refs/tags/*), sorted
pub fn list_tags(repo: &Repository) -> Result<Vec<String>> {
    Ok(list_with_prefix(repo, TAGS_PREFIX)?
        .into_iter()
        .filter_map(|r| r.strip_prefix(TAGS_PREFIX).map(str::to_string))
        .collect())
}

/// git refname rules, enough to reject the dangerous shapes
pub fn validate_ref_name(name: &str) -> Result<()> {
    let bad = |why: &str| Err(Error::MalformedRef(format!("invalid ref name {name:?}: {why}")));
    if name.is_empty() {
        return bad("empty");
    }
    if name.starts_with('/') || name.ends_with('/') || name.starts_with('.') {
        return bad("leading/trailing separator");
    }
    if name.contains("..") || name.contains("//") || name.ends_with(".lock") {
        return bad("forbidden sequence");
    }
    for c in name.chars() {
        if c.is_control() || " ~^:?*[\\".contains(c) {
            return bad("forbidden character");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; 20])
    }

    #[test]
    fn test_fresh_head_is_unborn_main() {
        let (_dir, repo) = test_repo();
        assert_eq!(
            read_head(&repo).unwrap(),
            HeadState::Symbolic("refs/heads/main".into())
        );
        assert_eq!(head_id(&repo).unwrap(), None);
        assert_eq!(current_branch(&repo).unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_update_and_resolve_ref() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/main", &oid(1), None, "commit: one").unwrap();
        assert_eq!(resolve(&repo, "refs/heads/main").unwrap(), Some(oid(1)));
        assert_eq!(head_id(&repo).unwrap(), Some(oid(1)));
    }

    #[test]
    fn test_cas_success_and_failure() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/main", &oid(1), None, "one").unwrap();
        update_ref(&repo, "refs/heads/main", &oid(2), Some(&oid(1)), "two").unwrap();
        let err = update_ref(&repo, "refs/heads/main", &oid(3), Some(&oid(1)), "three");
        assert!(matches!(err, Err(Error::RefUpdateRejected { .. })));
        assert_eq!(resolve(&repo, "refs/heads/main").unwrap(), Some(oid(2)));
    }

    #[test]
    fn test_lock_held() {
        let (_dir, repo) = test_repo();
        std::fs::create_dir_all(repo.git_dir().join("refs/heads")).unwrap();
        std::fs::write(repo.git_dir().join("refs/heads/main.lock"), "").unwrap();
        let err = update_ref(&repo, "refs/heads/main", &oid(1), None, "x");
        assert!(matches!(err, Err(Error::LockHeld(_))));
    }

    #[test]
    fn test_failed_cas_releases_lock() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/main", &oid(1), None, "one").unwrap();
        let _ = update_ref(&repo, "refs/heads/main", &oid(3), Some(&oid(9)), "bad");
        // lock must be gone so the next update can proceed
        update_ref(&repo, "refs/heads/main", &oid(2), Some(&oid(1)), "two").unwrap();
    }

    #[test]
    fn test_packed_refs_fallback() {
        let (_dir, repo) = test_repo();
        std::fs::write(
            repo.git_dir().join("packed-refs"),
            format!(
                "# pack-refs with: peeled fully-peeled sorted\n{} refs/heads/packed\n^{}\n",
                oid(5),
                oid(6)
            ),
        )
        .unwrap();
        assert_eq!(resolve(&repo, "refs/heads/packed").unwrap(), Some(oid(5)));
        // loose wins over packed
        update_ref(&repo, "refs/heads/packed", &oid(7), None, "x").unwrap();
        assert_eq!(resolve(&repo, "refs/heads/packed").unwrap(), Some(oid(7)));
    }

    #[test]
    fn test_symref_cycle_is_malformed() {
        let (_dir, repo) = test_repo();
        std::fs::create_dir_all(repo.git_dir().join("refs/heads")).unwrap();
        std::fs::write(repo.git_dir().join("refs/heads/a"), "ref: refs/heads/b\n").unwrap();
        std::fs::write(repo.git_dir().join("refs/heads/b"), "ref: refs/heads/a\n").unwrap();
        assert!(matches!(
            resolve(&repo, "refs/heads/a"),
            Err(Error::MalformedRef(_))
        ));
    }

    #[test]
    fn test_head_transitions() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/main", &oid(1), None, "one").unwrap();

        update_head(&repo, &HeadState::Detached(oid(1)), "checkout: detach").unwrap();
        assert_eq!(current_branch(&repo).unwrap(), None);
        assert_eq!(head_id(&repo).unwrap(), Some(oid(1)));

        update_head(
            &repo,
            &HeadState::Symbolic("refs/heads/main".into()),
            "checkout: moving to main",
        )
        .unwrap();
        assert_eq!(current_branch(&repo).unwrap().as_deref(), Some("main"));
    }

    #[test]
    fn test_update_branch_logs_head_too() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/main", &oid(1), None, "commit: initial").unwrap();
        let head_log = crate::reflog::read(&repo, "HEAD").unwrap();
        let branch_log = crate::reflog::read(&repo, "refs/heads/main").unwrap();
        assert_eq!(head_log.len(), 1);
        assert_eq!(branch_log.len(), 1);
        assert_eq!(head_log[0].new, oid(1));
    }

    #[test]
    fn test_list_branches_and_tags() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/main", &oid(1), None, "x").unwrap();
        update_ref(&repo, "refs/heads/dev", &oid(2), None, "x").unwrap();
        update_ref(&repo, "refs/tags/v1", &oid(3), None, "x").unwrap();

        assert_eq!(list_branches(&repo).unwrap(), vec!["dev", "main"]);
        assert_eq!(list_tags(&repo).unwrap(), vec!["v1"]);
    }

    #[test]
    fn test_validate_ref_name() {
        assert!(validate_ref_name("feature/x").is_ok());
        assert!(validate_ref_name("v1.0").is_ok());
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("a..b").is_err());
        assert!(validate_ref_name("has space").is_err());
        assert!(validate_ref_name("tilde~1").is_err());
        assert!(validate_ref_name(".hidden").is_err());
        assert!(validate_ref_name("x.lock").is_err());
    }

    #[test]
    fn test_delete_ref() {
        let (_dir, repo) = test_repo();
        update_ref(&repo, "refs/heads/gone", &oid(1), None, "x").unwrap();
        delete_ref(&repo, "refs/heads/gone").unwrap();
        assert_eq!(resolve(&repo, "refs/heads/gone").unwrap(), None);
        assert!(delete_ref(&repo, "refs/heads/gone").is_err());
    }
}
