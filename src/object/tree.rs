use crate::error::{Error, Result};
use crate::hash::ObjectId;

/// file mode of a tree entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Directory,
}

impl FileMode {
    /// mode as stored in tree raw bytes (git drops the leading zero on trees)
    pub fn raw_str(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Directory => "40000",
        }
    }

    /// mode as displayed by ls-tree (zero-padded to 6 chars)
    pub fn display_str(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Directory => "040000",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "100644" => Ok(FileMode::Regular),
            "100755" => Ok(FileMode::Executable),
            "120000" => Ok(FileMode::Symlink),
            "40000" | "040000" => Ok(FileMode::Directory),
            other => Err(Error::MalformedObject(format!("bad tree mode: {other}"))),
        }
    }

    /// from the u32 mode stored in the staging index
    pub fn from_u32(mode: u32) -> Result<Self> {
        match mode {
            0o100644 => Ok(FileMode::Regular),
            0o100755 => Ok(FileMode::Executable),
            0o120000 => Ok(FileMode::Symlink),
            0o040000 => Ok(FileMode::Directory),
            other => Err(Error::MalformedIndex(format!("bad mode {other:o}"))),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            FileMode::Regular => 0o100644,
            FileMode::Executable => 0o100755,
            FileMode::Symlink => 0o120000,
            FileMode::Directory => 0o040000,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileMode::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, FileMode::Regular | FileMode::Executable)
    }
}

/// single tree entry: mode, name, object id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// git tree sort key: directory names compare as if they ended with '/'
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode.is_dir() {
            key.push(b'/');
        }
        key
    }
}

/// tree object: ordered entries, raw bytes preserved for exact round-trip
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
    raw: Vec<u8>,
}

impl Tree {
    /// build a tree from entries, sorting them the way git does
    pub fn from_entries(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let mut raw = Vec::new();
        for entry in &entries {
            raw.extend_from_slice(entry.mode.raw_str().as_bytes());
            raw.push(b' ');
            raw.extend_from_slice(entry.name.as_bytes());
            raw.push(0);
            raw.extend_from_slice(entry.id.as_bytes());
        }
        Self { entries, raw }
    }

    /// parse tree content, keeping the exact input bytes
    pub fn from_content(content: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0;
        while pos < content.len() {
            let nul = content[pos..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| Error::MalformedObject("tree entry missing NUL".into()))?
                + pos;
            let head = std::str::from_utf8(&content[pos..nul])
                .map_err(|_| Error::MalformedObject("tree entry not utf-8".into()))?;
            let (mode_str, name) = head
                .split_once(' ')
                .ok_or_else(|| Error::MalformedObject(format!("bad tree entry: {head}")))?;
            if name.is_empty() {
                return Err(Error::MalformedObject("empty tree entry name".into()));
            }
            let mode = FileMode::parse(mode_str)?;
            let id_end = nul + 21;
            if id_end > content.len() {
                return Err(Error::MalformedObject("tree entry id truncated".into()));
            }
            let id = ObjectId::from_slice(&content[nul + 1..id_end])?;
            entries.push(TreeEntry::new(mode, name, id));
            pos = id_end;
        }
        Ok(Self {
            entries,
            raw: content.to_vec(),
        })
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn content(&self) -> &[u8] {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// find entry by name
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn id(&self) -> ObjectId {
        crate::hash::object_digest("tree", &self.raw)
    }
}
