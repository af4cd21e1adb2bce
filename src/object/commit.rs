use crate::error::{Error, Result};
use crate::hash::ObjectId;

/// author/committer identity: `Name <email> epoch ±HHMM`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    /// `Name <email>` as one string, exactly as stored
    pub who: String,
    pub timestamp: i64,
    pub tz_offset: String,
}

impl Ident {
    pub fn new(who: impl Into<String>, timestamp: i64, tz_offset: impl Into<String>) -> Self {
        Self {
            who: who.into(),
            timestamp,
            tz_offset: tz_offset.into(),
        }
    }

    /// parse `Name <email> 1234567890 +0000`
    pub fn parse(s: &str) -> Result<Self> {
        let (rest, tz) = s
            .rsplit_once(' ')
            .ok_or_else(|| Error::MalformedObject(format!("bad ident: {s}")))?;
        let (who, ts) = rest
            .rsplit_once(' ')
            .ok_or_else(|| Error::MalformedObject(format!("bad ident: {s}")))?;
        let timestamp = ts
            .parse()
            .map_err(|_| Error::MalformedObject(format!("bad ident timestamp: {s}")))?;
        Ok(Self::new(who, timestamp, tz))
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.who, self.timestamp, self.tz_offset)
    }
}

/// commit object; raw bytes are preserved so signed commits re-hash exactly
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Ident,
    pub committer: Ident,
    /// multi-line signature block, without the "gpgsig " prefix or the
    /// leading space of continuation lines
    pub gpgsig: Option<String>,
    pub message: String,
    raw: Vec<u8>,
}

impl Commit {
    /// build a new commit; the message gains a trailing newline if missing
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Ident,
        committer: Ident,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let mut raw = Vec::new();
        raw.extend_from_slice(format!("tree {tree}\n").as_bytes());
        for p in &parents {
            raw.extend_from_slice(format!("parent {p}\n").as_bytes());
        }
        raw.extend_from_slice(format!("author {author}\n").as_bytes());
        raw.extend_from_slice(format!("committer {committer}\n").as_bytes());
        raw.push(b'\n');
        raw.extend_from_slice(message.as_bytes());
        if !message.ends_with('\n') {
            raw.push(b'\n');
        }
        let mut commit = Self {
            tree,
            parents,
            author,
            committer,
            gpgsig: None,
            message,
            raw,
        };
        if !commit.message.ends_with('\n') {
            commit.message.push('\n');
        }
        commit
    }

    /// parse commit content, keeping the exact input bytes
    pub fn from_content(content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|_| Error::MalformedObject("commit is not utf-8".into()))?;
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut gpgsig: Option<String> = None;

        let mut lines = text.split('\n').peekable();
        loop {
            let line = lines
                .next()
                .ok_or_else(|| Error::MalformedObject("commit has no message".into()))?;
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Some(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                parents.push(ObjectId::from_hex(rest)?);
            } else if let Some(rest) = line.strip_prefix("author ") {
                author = Some(Ident::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("committer ") {
                committer = Some(Ident::parse(rest)?);
            } else if let Some(rest) = line.strip_prefix("gpgsig ") {
                let mut sig = vec![rest.to_string()];
                while let Some(cont) = lines.peek().and_then(|l| l.strip_prefix(' ')) {
                    sig.push(cont.to_string());
                    lines.next();
                }
                gpgsig = Some(sig.join("\n"));
            }
            // unknown headers are skipped here; raw preservation keeps them
        }
        let message: String = lines.collect::<Vec<_>>().join("\n");

        Ok(Self {
            tree: tree.ok_or_else(|| Error::MalformedObject("commit missing tree".into()))?,
            parents,
            author: author
                .ok_or_else(|| Error::MalformedObject("commit missing author".into()))?,
            committer: committer
                .ok_or_else(|| Error::MalformedObject("commit missing committer".into()))?,
            gpgsig,
            message,
            raw: content.to_vec(),
        })
    }

    pub fn content(&self) -> &[u8] {
        &self.raw
    }

    pub fn id(&self) -> ObjectId {
        crate::hash::object_digest("commit", &self.raw)
    }

    /// first line of the message
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }
}
