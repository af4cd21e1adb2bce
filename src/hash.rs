use std::fmt;

use sha1::{Digest, Sha1};

use crate::Error;

/// shortest object-id prefix rev-parse will accept
pub const MIN_PREFIX_LEN: usize = 4;

/// SHA-1 object id used for content addressing
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// zero id (useful as sentinel; git uses it for "no ref" in reflogs)
    pub const ZERO: ObjectId = ObjectId([0u8; 20]);

    /// create from raw bytes
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// create from a 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != 20 {
            return Err(Error::InvalidHex(hex::encode(bytes)));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// parse from hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHex(s.to_string()))?;
        if bytes.len() != 20 {
            return Err(Error::InvalidHex(s.to_string()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// convert to hex string (40 lowercase chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// abbreviated hex (7 chars, git's default short form)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    /// first byte (fanout bucket in pack indices)
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// split into loose-object path components (2 hex chars, 38 hex chars)
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..12])
    }
}

/// true if s is a full 40-char hex object id
pub fn is_full_hex(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// true if s could be an object-id prefix (>= MIN_PREFIX_LEN hex chars)
pub fn is_hex_prefix(s: &str) -> bool {
    s.len() >= MIN_PREFIX_LEN && s.len() <= 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// compute SHA-1 over raw bytes
pub fn sha1_digest(data: &[u8]) -> ObjectId {
    let digest = Sha1::digest(data);
    ObjectId(digest.into())
}

/// compute object id over the git framing: "<type> <size>\0" + content
pub fn object_digest(kind: &str, content: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(content.len().to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(content);
    ObjectId(hasher.finalize().into())
}

/// streaming SHA-1 for pack and index trailers
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> ObjectId {
        ObjectId(self.inner.finalize().into())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let original = ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let parsed = ObjectId::from_hex(&original.to_hex()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_invalid_hex() {
        assert!(ObjectId::from_hex("not valid hex").is_err());
        assert!(ObjectId::from_hex("abcd").is_err()); // too short
        assert!(ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef01ff").is_err()); // too long
    }

    #[test]
    fn test_path_components() {
        let h = ObjectId::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        let (dir, file) = h.to_path_components();
        assert_eq!(dir, "ab");
        assert_eq!(file, "cdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn test_ordering() {
        let h1 = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let h2 = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        assert!(h1 < h2);
    }

    #[test]
    fn test_blob_digest_known_value() {
        // `echo -n '' | git hash-object --stdin` == e69de29...
        let id = object_digest("blob", b"");
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn test_blob_digest_hello() {
        // `echo 'hello' | git hash-object --stdin`
        let id = object_digest("blob", b"hello\n");
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    }

    #[test]
    fn test_streaming_matches_direct() {
        let direct = sha1_digest(b"helloworld");
        let mut h = Hasher::new();
        h.update(b"hello");
        h.update(b"world");
        assert_eq!(direct, h.finalize());
    }

    #[test]
    fn test_prefix_predicates() {
        assert!(is_hex_prefix("abcd"));
        assert!(!is_hex_prefix("abc"));
        assert!(!is_hex_prefix("wxyz"));
        assert!(is_full_hex("abcdef0123456789abcdef0123456789abcdef01"));
        assert!(!is_full_hex("abcdef"));
    }
}
