use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::{Ident, Kind};

/// annotated tag object; raw bytes preserved for exact round-trip
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub object: ObjectId,
    pub target_kind: Kind,
    pub name: String,
    pub tagger: Option<Ident>,
    pub message: String,
    /// trailing PGP block, if the tag is signed (kept verbatim)
    pub gpg_signature: Option<String>,
    raw: Vec<u8>,
}

const PGP_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";

impl Tag {
    pub fn new(
        object: ObjectId,
        target_kind: Kind,
        name: impl Into<String>,
        tagger: Ident,
        message: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let message = message.into();
        let mut raw = Vec::new();
        raw.extend_from_slice(format!("object {object}\n").as_bytes());
        raw.extend_from_slice(format!("type {target_kind}\n").as_bytes());
        raw.extend_from_slice(format!("tag {name}\n").as_bytes());
        raw.extend_from_slice(format!("tagger {tagger}\n").as_bytes());
        raw.push(b'\n');
        raw.extend_from_slice(message.as_bytes());
        if !message.ends_with('\n') {
            raw.push(b'\n');
        }
        let mut tag = Self {
            object,
            target_kind,
            name,
            tagger: Some(tagger),
            message,
            gpg_signature: None,
            raw,
        };
        if !tag.message.ends_with('\n') {
            tag.message.push('\n');
        }
        tag
    }

    /// parse tag content, keeping the exact input bytes
    pub fn from_content(content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|_| Error::MalformedObject("tag is not utf-8".into()))?;
        let mut object = None;
        let mut target_kind = None;
        let mut name = None;
        let mut tagger = None;

        let mut lines = text.split('\n');
        loop {
            let line = lines
                .next()
                .ok_or_else(|| Error::MalformedObject("tag has no message".into()))?;
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("object ") {
                object = Some(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("type ") {
                target_kind = Some(Kind::from_str(rest)?);
            } else if let Some(rest) = line.strip_prefix("tag ") {
                name = Some(rest.to_string());
            } else if let Some(rest) = line.strip_prefix("tagger ") {
                tagger = Some(Ident::parse(rest)?);
            }
        }
        let body: String = lines.collect::<Vec<_>>().join("\n");

        // a signed tag carries the PGP block appended after the message
        let (message, gpg_signature) = match body.find(PGP_BEGIN) {
            Some(at) => (
                body[..at].trim_end_matches('\n').to_string() + "\n",
                Some(body[at..].to_string()),
            ),
            None => (body, None),
        };

        Ok(Self {
            object: object.ok_or_else(|| Error::MalformedObject("tag missing object".into()))?,
            target_kind: target_kind
                .ok_or_else(|| Error::MalformedObject("tag missing type".into()))?,
            name: name.ok_or_else(|| Error::MalformedObject("tag missing name".into()))?,
            tagger,
            message,
            gpg_signature,
            raw: content.to_vec(),
        })
    }

    pub fn content(&self) -> &[u8] {
        &self.raw
    }

    pub fn id(&self) -> ObjectId {
        crate::hash::object_digest("tag", &self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> ObjectId {
        ObjectId::from_bytes([n; 20])
    }

    fn ident() -> Ident {
        Ident::new("Tagger <t@example.com>", 1700000000, "+0000")
    }

    #[test]
    fn test_tag_roundtrip() {
        let tag = Tag::new(oid(7), Kind::Commit, "v1.0", ident(), "release v1.0\n");
        let parsed = Tag::from_content(tag.content()).unwrap();
        assert_eq!(parsed.object, oid(7));
        assert_eq!(parsed.target_kind, Kind::Commit);
        assert_eq!(parsed.name, "v1.0");
        assert_eq!(parsed.tagger, Some(ident()));
        assert_eq!(parsed.message, "release v1.0\n");
        assert_eq!(parsed.content(), tag.content());
        assert_eq!(parsed.id(), tag.id());
    }

    #[test]
    fn test_signed_tag_splits_signature() {
        let raw = b"object 1111111111111111111111111111111111111111\n\
type commit\n\
tag v2\n\
tagger T <t@x> 1 +0000\n\
\n\
release\n\
-----BEGIN PGP SIGNATURE-----\nabc\n-----END PGP SIGNATURE-----\n";
        let tag = Tag::from_content(raw).unwrap();
        assert_eq!(tag.message, "release\n");
        assert!(tag.gpg_signature.as_deref().unwrap().starts_with(PGP_BEGIN));
        assert_eq!(tag.content(), raw);
    }

    #[test]
    fn test_tag_without_tagger() {
        // old git allowed taggerless tags; parse must not reject them
        let raw = b"object 1111111111111111111111111111111111111111\n\
type commit\n\
tag ancient\n\
\n\
msg\n";
        let tag = Tag::from_content(raw).unwrap();
        assert!(tag.tagger.is_none());
        assert_eq!(tag.content(), raw);
    }
}
