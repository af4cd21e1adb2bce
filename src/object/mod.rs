//! git object model: blob, tree, commit, tag
//!
//! parsing keeps the exact input bytes so `serialize` round-trips
//! byte-for-byte; the object id is SHA-1 over `"<kind> <size>\0" + content`.

pub mod blob;
pub mod commit;
pub mod tag;
pub mod tree;

pub use blob::Blob;
pub use commit::{Commit, Ident};
pub use tag::Tag;
pub use tree::{FileMode, Tree, TreeEntry};

use crate::error::{Error, Result};
use crate::hash::{object_digest, ObjectId};

/// object kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Blob => "blob",
            Kind::Tree => "tree",
            Kind::Commit => "commit",
            Kind::Tag => "tag",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Kind::Blob),
            "tree" => Ok(Kind::Tree),
            "commit" => Ok(Kind::Commit),
            "tag" => Ok(Kind::Tag),
            other => Err(Error::MalformedObject(format!("unknown kind: {other}"))),
        }
    }

    /// pack entry type number (commit=1, tree=2, blob=3, tag=4)
    pub fn pack_type(&self) -> u8 {
        match self {
            Kind::Commit => 1,
            Kind::Tree => 2,
            Kind::Blob => 3,
            Kind::Tag => 4,
        }
    }

    pub fn from_pack_type(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Kind::Commit),
            2 => Ok(Kind::Tree),
            3 => Ok(Kind::Blob),
            4 => Ok(Kind::Tag),
            other => Err(Error::MalformedPack(format!("unknown entry type {other}"))),
        }
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// a parsed git object
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Object::Blob(_) => Kind::Blob,
            Object::Tree(_) => Kind::Tree,
            Object::Commit(_) => Kind::Commit,
            Object::Tag(_) => Kind::Tag,
        }
    }

    /// raw content bytes (without the framing header)
    pub fn content(&self) -> &[u8] {
        match self {
            Object::Blob(b) => &b.content,
            Object::Tree(t) => t.content(),
            Object::Commit(c) => c.content(),
            Object::Tag(t) => t.content(),
        }
    }

    /// object id: SHA-1 over the framed bytes
    pub fn id(&self) -> ObjectId {
        object_digest(self.kind().as_str(), self.content())
    }

    /// framed bytes: `"<kind> <size>\0" + content`
    pub fn frame(&self) -> Vec<u8> {
        frame(self.kind(), self.content())
    }

    /// parse content bytes of a known kind
    pub fn parse(kind: Kind, content: &[u8]) -> Result<Object> {
        Ok(match kind {
            Kind::Blob => Object::Blob(Blob::new(content.to_vec())),
            Kind::Tree => Object::Tree(Tree::from_content(content)?),
            Kind::Commit => Object::Commit(Commit::from_content(content)?),
            Kind::Tag => Object::Tag(Tag::from_content(content)?),
        })
    }

    /// parse framed bytes (`"<kind> <size>\0" + content`)
    pub fn parse_framed(raw: &[u8]) -> Result<Object> {
        let (kind, content) = split_frame(raw)?;
        Object::parse(kind, content)
    }

    pub fn as_commit(&self) -> Result<&Commit> {
        match self {
            Object::Commit(c) => Ok(c),
            other => Err(Error::MalformedObject(format!(
                "expected commit, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_tree(&self) -> Result<&Tree> {
        match self {
            Object::Tree(t) => Ok(t),
            other => Err(Error::MalformedObject(format!(
                "expected tree, found {}",
                other.kind()
            ))),
        }
    }

    pub fn as_blob(&self) -> Result<&Blob> {
        match self {
            Object::Blob(b) => Ok(b),
            other => Err(Error::MalformedObject(format!(
                "expected blob, found {}",
                other.kind()
            ))),
        }
    }
}

/// build framed bytes for a kind + content
pub fn frame(kind: Kind, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 16);
    out.extend_from_slice(kind.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(content.len().to_string().as_bytes());
    out.push(0);
    out.extend_from_slice(content);
    out
}

/// split framed bytes into (kind, content); validates the declared size
pub fn split_frame(raw: &[u8]) -> Result<(Kind, &[u8])> {
    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::MalformedObject("no NUL in header".into()))?;
    let header = std::str::from_utf8(&raw[..nul])
        .map_err(|_| Error::MalformedObject("header is not ascii".into()))?;
    let (kind_str, size_str) = header
        .split_once(' ')
        .ok_or_else(|| Error::MalformedObject(format!("bad header: {header}")))?;
    let kind = Kind::from_str(kind_str)?;
    let size: usize = size_str
        .parse()
        .map_err(|_| Error::MalformedObject(format!("bad size: {size_str}")))?;
    let content = &raw[nul + 1..];
    if content.len() != size {
        return Err(Error::MalformedObject(format!(
            "size mismatch: header says {size}, got {}",
            content.len()
        )));
    }
    Ok((kind, content))
}

/// signature verification contract: report presence, never verify.
/// signed objects come back `(false, reason)`; unsigned `(true, "")`.
pub fn verify_signature(object: &Object) -> (bool, &'static str) {
    let signed = match object {
        Object::Commit(c) => c.gpgsig.is_some(),
        Object::Tag(t) => t.gpg_signature.is_some(),
        _ => false,
    };
    if signed {
        (false, "signature verification not implemented")
    } else {
        (true, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let raw = frame(Kind::Blob, b"hello\n");
        assert_eq!(raw, b"blob 6\0hello\n");
        let (kind, content) = split_frame(&raw).unwrap();
        assert_eq!(kind, Kind::Blob);
        assert_eq!(content, b"hello\n");
    }

    #[test]
    fn test_split_frame_rejects_bad_size() {
        assert!(split_frame(b"blob 7\0hello\n").is_err());
        assert!(split_frame(b"blob x\0hello\n").is_err());
        assert!(split_frame(b"blob 6 hello\n").is_err());
    }

    #[test]
    fn test_parse_framed_blob() {
        let obj = Object::parse_framed(b"blob 6\0hello\n").unwrap();
        assert_eq!(obj.kind(), Kind::Blob);
        assert_eq!(obj.content(), b"hello\n");
        assert_eq!(obj.id().to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_kind_pack_types() {
        for kind in [Kind::Blob, Kind::Tree, Kind::Commit, Kind::Tag] {
            assert_eq!(Kind::from_pack_type(kind.pack_type()).unwrap(), kind);
        }
        assert!(Kind::from_pack_type(6).is_err());
    }

    #[test]
    fn test_verify_signature_unsigned() {
        let obj = Object::Blob(Blob::new(b"x".to_vec()));
        assert_eq!(verify_signature(&obj), (true, ""));
    }
}
