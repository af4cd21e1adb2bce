//! staging index: binary DIRC v2 with strict ordering, SHA-1 trailer, and
//! a size+mtime stat cache

use std::io::Cursor;
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, IoResultExt, Result};
use crate::hash::{sha1_digest, Hasher, ObjectId};
use crate::repo::Repository;

const DIRC_SIGNATURE: &[u8; 4] = b"DIRC";
const DIRC_VERSION: u32 = 2;
const FLAGS_NAME_MASK: u16 = 0x0fff;
const FLAGS_STAGE_SHIFT: u16 = 12;
const FLAGS_STAGE_MASK: u16 = 0x3000;

/// environment toggle disabling the stat cache
pub const PARANOID_ENV: &str = "MINGIT_PARANOID";

/// one staged file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub ctime_s: u32,
    pub ctime_ns: u32,
    pub mtime_s: u32,
    pub mtime_ns: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub id: ObjectId,
    pub stage: u8,
    pub path: String,
}

impl IndexEntry {
    /// minimal entry carrying just id + mode (no stat cache)
    pub fn bare(path: impl Into<String>, id: ObjectId, mode: u32) -> Self {
        Self {
            ctime_s: 0,
            ctime_ns: 0,
            mtime_s: 0,
            mtime_ns: 0,
            dev: 0,
            ino: 0,
            mode,
            uid: 0,
            gid: 0,
            size: 0,
            id,
            stage: 0,
            path: path.into(),
        }
    }

    /// entry for a working-tree file, capturing its stat fields
    #[cfg(unix)]
    pub fn from_file(full: &Path, path: impl Into<String>, id: ObjectId) -> Result<Self> {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::symlink_metadata(full).with_path(full)?;
        let mode = if meta.file_type().is_symlink() {
            0o120000
        } else if meta.mode() & 0o111 != 0 {
            0o100755
        } else {
            0o100644
        };
        Ok(Self {
            ctime_s: meta.ctime() as u32,
            ctime_ns: meta.ctime_nsec() as u32,
            mtime_s: meta.mtime() as u32,
            mtime_ns: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            mode,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
            id,
            stage: 0,
            path: path.into(),
        })
    }

    fn sort_key(&self) -> (&[u8], u8) {
        (self.path.as_bytes(), self.stage)
    }

    /// true when the file on disk matches this entry by size and mtime.
    /// `MINGIT_PARANOID=1` forces a re-digest by reporting every file changed.
    pub fn stat_matches(&self, work_dir: &Path) -> bool {
        if std::env::var(PARANOID_ENV).as_deref() == Ok("1") {
            return false;
        }
        let full = work_dir.join(&self.path);
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            match std::fs::symlink_metadata(&full) {
                Ok(meta) => {
                    meta.len() as u32 == self.size
                        && meta.mtime() as u32 == self.mtime_s
                        && meta.mtime_nsec() as u32 == self.mtime_ns
                }
                Err(_) => false,
            }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

/// the staging index; entries strictly ascending by (path bytes, stage)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    /// load the repository index; a missing file is an empty index
    pub fn load(repo: &Repository) -> Result<Self> {
        let path = repo.index_file();
        match std::fs::read(&path) {
            Ok(data) => Self::parse(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 + 20 {
            return Err(Error::MalformedIndex("index too short".into()));
        }
        if &data[..4] != DIRC_SIGNATURE {
            return Err(Error::MalformedIndex("bad signature".into()));
        }
        let body = &data[..data.len() - 20];
        let stored = &data[data.len() - 20..];
        if sha1_digest(body).as_bytes() != stored {
            return Err(Error::IndexChecksumMismatch);
        }

        let mut cursor = Cursor::new(&body[4..12]);
        let version = cursor.read_u32::<BigEndian>().expect("len checked");
        if version != DIRC_VERSION {
            return Err(Error::MalformedIndex(format!("version {version}")));
        }
        let count = cursor.read_u32::<BigEndian>().expect("len checked") as usize;

        let mut entries = Vec::with_capacity(count);
        let mut pos = 12;
        for _ in 0..count {
            if pos + 62 > body.len() {
                return Err(Error::MalformedIndex("entry truncated".into()));
            }
            let entry_start = pos;
            let mut cursor = Cursor::new(&body[pos..pos + 40]);
            let ctime_s = cursor.read_u32::<BigEndian>().expect("len checked");
            let ctime_ns = cursor.read_u32::<BigEndian>().expect("len checked");
            let mtime_s = cursor.read_u32::<BigEndian>().expect("len checked");
            let mtime_ns = cursor.read_u32::<BigEndian>().expect("len checked");
            let dev = cursor.read_u32::<BigEndian>().expect("len checked");
            let ino = cursor.read_u32::<BigEndian>().expect("len checked");
            let mode = cursor.read_u32::<BigEndian>().expect("len checked");
            let uid = cursor.read_u32::<BigEndian>().expect("len checked");
            let gid = cursor.read_u32::<BigEndian>().expect("len checked");
            let size = cursor.read_u32::<BigEndian>().expect("len checked");
            pos += 40;
            let id = ObjectId::from_slice(&body[pos..pos + 20])?;
            pos += 20;
            let flags = u16::from_be_bytes([body[pos], body[pos + 1]]);
            pos += 2;

            let name_len = (flags & FLAGS_NAME_MASK) as usize;
            let path_bytes = if name_len == FLAGS_NAME_MASK as usize {
                let nul = body[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| Error::MalformedIndex("unterminated path".into()))?;
                &body[pos..pos + nul]
            } else {
                if pos + name_len > body.len() {
                    return Err(Error::MalformedIndex("path truncated".into()));
                }
                &body[pos..pos + name_len]
            };
            let path = String::from_utf8(path_bytes.to_vec())
                .map_err(|_| Error::MalformedIndex("path not utf-8".into()))?;
            pos += path_bytes.len();

            entries.push(IndexEntry {
                ctime_s,
                ctime_ns,
                mtime_s,
                mtime_ns,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
                id,
                stage: ((flags & FLAGS_STAGE_MASK) >> FLAGS_STAGE_SHIFT) as u8,
                path,
            });

            // entries are NUL-terminated and padded to 8-byte alignment
            let consumed = pos - entry_start + 1;
            pos = entry_start + (consumed + 7) / 8 * 8;
            if pos > body.len() {
                return Err(Error::MalformedIndex("padding out of range".into()));
            }
        }
        // unknown trailing extensions between entries and checksum are ignored

        for pair in entries.windows(2) {
            if pair[0].sort_key() >= pair[1].sort_key() {
                return Err(Error::MalformedIndex(format!(
                    "entries out of order at {:?}",
                    pair[1].path
                )));
            }
        }

        Ok(Self { entries })
    }

    /// serialize to DIRC v2 bytes with the SHA-1 trailer
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(DIRC_SIGNATURE);
        out.write_u32::<BigEndian>(DIRC_VERSION).expect("vec write");
        out.write_u32::<BigEndian>(self.entries.len() as u32)
            .expect("vec write");
        for entry in &self.entries {
            let entry_start = out.len();
            for field in [
                entry.ctime_s,
                entry.ctime_ns,
                entry.mtime_s,
                entry.mtime_ns,
                entry.dev,
                entry.ino,
                entry.mode,
                entry.uid,
                entry.gid,
                entry.size,
            ] {
                out.write_u32::<BigEndian>(field).expect("vec write");
            }
            out.extend_from_slice(entry.id.as_bytes());
            let name_len = entry.path.len().min(FLAGS_NAME_MASK as usize) as u16;
            let flags = name_len | ((entry.stage as u16) << FLAGS_STAGE_SHIFT);
            out.write_u16::<BigEndian>(flags).expect("vec write");
            out.extend_from_slice(entry.path.as_bytes());
            out.push(0);
            while (out.len() - entry_start) % 8 != 0 {
                out.push(0);
            }
        }
        let mut hasher = Hasher::new();
        hasher.update(&out);
        let sha = hasher.finalize();
        out.extend_from_slice(sha.as_bytes());
        out
    }

    /// write the repository index atomically (temp + rename)
    pub fn save(&self, repo: &Repository) -> Result<()> {
        let path = repo.index_file();
        let dir = path.parent().expect("index path has a parent");
        let tmp = dir.join(format!(".tmp-index-{}", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, self.serialize()).with_path(&tmp)?;
        std::fs::rename(&tmp, &path).with_path(&path)?;
        Ok(())
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// stage-0 entry for a path
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries
            .iter()
            .find(|e| e.path == path && e.stage == 0)
    }

    /// insert or replace an entry (matching path + stage)
    pub fn upsert(&mut self, entry: IndexEntry) {
        let key = (entry.path.clone(), entry.stage);
        match self
            .entries
            .binary_search_by(|e| e.sort_key().cmp(&(key.0.as_bytes(), key.1)))
        {
            Ok(at) => self.entries[at] = entry,
            Err(at) => self.entries.insert(at, entry),
        }
    }

    /// remove every stage of a path; true if something was removed
    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path != path);
        self.entries.len() < before
    }

    /// drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// record a conflict: stage-0 entry is replaced by stages 1/2/3
    /// (base/ours/theirs); absent sides are skipped
    pub fn set_conflict(
        &mut self,
        path: &str,
        base: Option<(ObjectId, u32)>,
        ours: Option<(ObjectId, u32)>,
        theirs: Option<(ObjectId, u32)>,
    ) {
        self.remove(path);
        for (stage, slot) in [(1u8, base), (2, ours), (3, theirs)] {
            if let Some((id, mode)) = slot {
                let mut entry = IndexEntry::bare(path, id, mode);
                entry.stage = stage;
                self.upsert(entry);
            }
        }
    }

    /// paths with any entry above stage 0
    pub fn unmerged_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.stage != 0)
            .map(|e| e.path.clone())
            .collect();
        paths.dedup();
        paths
    }

    pub fn has_conflicts(&self) -> bool {
        self.entries.iter().any(|e| e.stage != 0)
    }

    /// stage-0 (path, id) pairs
    pub fn flattened(&self) -> Vec<(String, ObjectId)> {
        self.entries
            .iter()
            .filter(|e| e.stage == 0)
            .map(|e| (e.path.clone(), e.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; 20])
    }

    fn entry(path: &str, n: u8) -> IndexEntry {
        IndexEntry::bare(path, oid(n), 0o100644)
    }

    #[test]
    fn test_serialize_parse_roundtrip() {
        let mut index = Index::default();
        index.upsert(entry("a.txt", 1));
        index.upsert(entry("dir/b.txt", 2));
        index.upsert(entry("z.txt", 3));

        let bytes = index.serialize();
        let parsed = Index::parse(&bytes).unwrap();
        assert_eq!(parsed, index);
    }

    #[test]
    fn test_checksum_detected() {
        let mut index = Index::default();
        index.upsert(entry("a.txt", 1));
        let mut bytes = index.serialize();
        let at = bytes.len() / 2;
        bytes[at] ^= 0xff;
        assert!(matches!(
            Index::parse(&bytes),
            Err(Error::IndexChecksumMismatch) | Err(Error::MalformedIndex(_))
        ));
    }

    #[test]
    fn test_order_enforced_on_parse() {
        // craft an out-of-order index by bypassing upsert's sorting
        let mut index = Index::default();
        index.entries.push(entry("b.txt", 1));
        index.entries.push(entry("a.txt", 2));
        let bytes = index.serialize();
        assert!(matches!(
            Index::parse(&bytes),
            Err(Error::MalformedIndex(_))
        ));
    }

    #[test]
    fn test_upsert_keeps_order_and_replaces() {
        let mut index = Index::default();
        index.upsert(entry("c", 1));
        index.upsert(entry("a", 2));
        index.upsert(entry("b", 3));
        let paths: Vec<_> = index.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["a", "b", "c"]);

        index.upsert(entry("b", 9));
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("b").unwrap().id, oid(9));
    }

    #[test]
    fn test_save_load() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut index = Index::default();
        index.upsert(entry("file.txt", 4));
        index.save(&repo).unwrap();

        let loaded = Index::load(&repo).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_missing_index_is_empty() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert!(Index::load(&repo).unwrap().is_empty());
    }

    #[test]
    fn test_conflict_stages() {
        let mut index = Index::default();
        index.upsert(entry("f", 1));
        index.set_conflict(
            "f",
            Some((oid(1), 0o100644)),
            Some((oid(2), 0o100644)),
            Some((oid(3), 0o100644)),
        );
        assert!(index.has_conflicts());
        assert_eq!(index.unmerged_paths(), vec!["f"]);
        assert_eq!(index.get("f"), None);
        assert_eq!(index.len(), 3);

        // stages round-trip through the binary form
        let parsed = Index::parse(&index.serialize()).unwrap();
        let stages: Vec<u8> = parsed.entries().iter().map(|e| e.stage).collect();
        assert_eq!(stages, [1, 2, 3]);
    }

    #[test]
    fn test_from_file_captures_stat() {
        let dir = tempdir().unwrap();
        let full = dir.path().join("f.txt");
        std::fs::write(&full, b"content").unwrap();
        let entry = IndexEntry::from_file(&full, "f.txt", oid(1)).unwrap();
        assert_eq!(entry.size, 7);
        assert!(entry.mtime_s > 0);
        assert_eq!(entry.mode, 0o100644);
        assert!(entry.stat_matches(dir.path()));

        std::fs::write(&full, b"changed!!").unwrap();
        assert!(!entry.stat_matches(dir.path()));
    }

    #[test]
    fn test_executable_mode() {
        let dir = tempdir().unwrap();
        let full = dir.path().join("run.sh");
        std::fs::write(&full, b"#!/bin/sh\n").unwrap();
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&full, std::fs::Permissions::from_mode(0o755)).unwrap();
        let entry = IndexEntry::from_file(&full, "run.sh", oid(1)).unwrap();
        assert_eq!(entry.mode, 0o100755);
    }

    #[test]
    fn test_unknown_extension_ignored() {
        let mut index = Index::default();
        index.upsert(entry("a", 1));
        let bytes = index.serialize();
        // splice an unknown extension between entries and checksum
        let body_end = bytes.len() - 20;
        let mut with_ext = bytes[..body_end].to_vec();
        with_ext.extend_from_slice(b"TREE");
        with_ext.extend_from_slice(&4u32.to_be_bytes());
        with_ext.extend_from_slice(b"junk");
        let sha = sha1_digest(&with_ext);
        with_ext.extend_from_slice(sha.as_bytes());
        let parsed = Index::parse(&with_ext).unwrap();
        assert_eq!(parsed.len(), 1);
    }
}
