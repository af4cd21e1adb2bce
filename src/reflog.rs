use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::error::{Error, IoResultExt, Result};
use crate::hash::ObjectId;
use crate::repo::Repository;

/// one reflog line: `old new ident ts tz\tmessage`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: ObjectId,
    pub new: ObjectId,
    pub who: String,
    pub timestamp: i64,
    pub tz_offset: String,
    pub message: String,
}

/// log file for a ref: `logs/HEAD`, `logs/refs/heads/<b>`, ...
pub fn log_path(repo: &Repository, refname: &str) -> PathBuf {
    repo.git_dir().join("logs").join(refname)
}

/// append one entry; creates the log file and parents as needed.
///
/// the write is a single O_APPEND write so concurrent appends do not
/// interleave within a line.
pub fn append(
    repo: &Repository,
    refname: &str,
    old: &ObjectId,
    new: &ObjectId,
    message: &str,
) -> Result<()> {
    let path = log_path(repo, refname);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    let who = crate::ops::identity::committer_ident(repo)?;
    let message = message.replace(['\n', '\r'], " ");
    let line = format!("{old} {new} {who}\t{}\n", message.trim());
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_path(&path)?;
    file.write_all(line.as_bytes()).with_path(&path)?;
    Ok(())
}

/// read all entries, oldest first; malformed lines are skipped
pub fn read(repo: &Repository, refname: &str) -> Result<Vec<ReflogEntry>> {
    let path = log_path(repo, refname);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io { path, source: e }),
    };
    let mut entries = Vec::new();
    for line in content.lines() {
        let Some((head, message)) = line.split_once('\t') else {
            continue;
        };
        let fields: Vec<&str> = head.split(' ').collect();
        if fields.len() < 5 {
            continue;
        }
        let (Ok(old), Ok(new)) = (ObjectId::from_hex(fields[0]), ObjectId::from_hex(fields[1]))
        else {
            continue;
        };
        let Ok(timestamp) = fields[fields.len() - 2].parse() else {
            continue;
        };
        entries.push(ReflogEntry {
            old,
            new,
            who: fields[2..fields.len() - 2].join(" "),
            timestamp,
            tz_offset: fields[fields.len() - 1].to_string(),
            message: message.to_string(),
        });
    }
    Ok(entries)
}

/// drop the newest entry, rewriting the log (stash pop bookkeeping)
pub fn drop_newest(repo: &Repository, refname: &str) -> Result<()> {
    let entries = read(repo, refname)?;
    let path = log_path(repo, refname);
    if entries.len() <= 1 {
        if path.exists() {
            fs::remove_file(&path).with_path(&path)?;
        }
        return Ok(());
    }
    let mut out = String::new();
    for entry in &entries[..entries.len() - 1] {
        out.push_str(&format!(
            "{} {} {} {} {}\t{}\n",
            entry.old, entry.new, entry.who, entry.timestamp, entry.tz_offset, entry.message
        ));
    }
    fs::write(&path, out).with_path(&path)?;
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
    fn test_append_and_read() {
        let (_dir, repo) = test_repo();
        append(&repo, "HEAD", &ObjectId::ZERO, &oid(1), "commit: initial").unwrap();
        append(&repo, "HEAD", &oid(1), &oid(2), "commit: second").unwrap();

        let entries = read(&repo, "HEAD").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].old, ObjectId::ZERO);
        assert_eq!(entries[0].new, oid(1));
        assert_eq!(entries[0].message, "commit: initial");
        assert_eq!(entries[1].new, oid(2));
        assert!(entries[0].who.contains('<'));
    }

    #[test]
    fn test_branch_log_path() {
        let (_dir, repo) = test_repo();
        append(&repo, "refs/heads/main", &ObjectId::ZERO, &oid(1), "m").unwrap();
        assert!(repo.git_dir().join("logs/refs/heads/main").is_file());
    }

    #[test]
    fn test_newlines_in_message_flattened() {
        let (_dir, repo) = test_repo();
        append(&repo, "HEAD", &ObjectId::ZERO, &oid(1), "multi\nline").unwrap();
        let entries = read(&repo, "HEAD").unwrap();
        assert_eq!(entries[0].message, "multi line");
    }

    #[test]
    fn test_missing_log_is_empty() {
        let (_dir, repo) = test_repo();
        assert!(read(&repo, "refs/heads/none").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let (_dir, repo) = test_repo();
        let path = log_path(&repo, "HEAD");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "garbage line\n알 수 없는\n").unwrap();
        append(&repo, "HEAD", &ObjectId::ZERO, &oid(1), "good").unwrap();
        let entries = read(&repo, "HEAD").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "good");
    }

    #[test]
    fn test_drop_newest() {
        let (_dir, repo) = test_repo();
        append(&repo, STASH_TEST, &ObjectId::ZERO, &oid(1), "one").unwrap();
        append(&repo, STASH_TEST, &oid(1), &oid(2), "two").unwrap();
        drop_newest(&repo, STASH_TEST).unwrap();
        let entries = read(&repo, STASH_TEST).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "one");

        drop_newest(&repo, STASH_TEST).unwrap();
        assert!(read(&repo, STASH_TEST).unwrap().is_empty());
        assert!(!log_path(&repo, STASH_TEST).exists());
    }

    const STASH_TEST: &str = "refs/stash";
}
