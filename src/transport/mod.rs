//! transports and synchronization: local, dumb HTTP, smart pkt-line

pub mod clone;
pub mod fetch;
pub mod http;
pub mod local;
pub mod pkt;
pub mod push;
pub mod refspec;
pub mod smart;

pub use clone::clone;
pub use fetch::{fetch, FetchResult};
pub use push::{push, PushResult};
pub use refspec::Refspec;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::Kind;

/// default deadline for remote operations
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// capability surface every transport offers.
///
/// `fetch_pack` is optional: transports without pack support return None
/// and callers fall back to object-by-object copying.
pub trait Transport {
    /// advertised refs as (refname, id)
    fn list_refs(&mut self) -> Result<Vec<(String, ObjectId)>>;

    /// one object's kind and content
    fn get_object(&mut self, id: &ObjectId) -> Result<(Kind, Vec<u8>)>;

    fn has_object(&mut self, id: &ObjectId) -> Result<bool>;

    /// negotiate wants/haves and receive a pack, when the transport can
    fn fetch_pack(
        &mut self,
        _wants: &[ObjectId],
        _haves: &[ObjectId],
    ) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// where a remote URL points
pub enum Remote {
    Local(local::LocalTransport),
    Http(http::DumbHttpTransport),
    Smart(smart::SmartTransport),
}

impl Transport for Remote {
    fn list_refs(&mut self) -> Result<Vec<(String, ObjectId)>> {
        match self {
            Remote::Local(t) => t.list_refs(),
            Remote::Http(t) => t.list_refs(),
            Remote::Smart(t) => t.list_refs(),
        }
    }

    fn get_object(&mut self, id: &ObjectId) -> Result<(Kind, Vec<u8>)> {
        match self {
            Remote::Local(t) => t.get_object(id),
            Remote::Http(t) => t.get_object(id),
            Remote::Smart(t) => t.get_object(id),
        }
    }

    fn has_object(&mut self, id: &ObjectId) -> Result<bool> {
        match self {
            Remote::Local(t) => t.has_object(id),
            Remote::Http(t) => t.has_object(id),
            Remote::Smart(t) => t.has_object(id),
        }
    }

    fn fetch_pack(&mut self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<Option<Vec<u8>>> {
        match self {
            Remote::Local(t) => t.fetch_pack(wants, haves),
            Remote::Http(t) => t.fetch_pack(wants, haves),
            Remote::Smart(t) => t.fetch_pack(wants, haves),
        }
    }
}

/// pick a transport for a URL: `git://` is smart, `http(s)://` is dumb,
/// anything else is a local path (with `file://` stripped)
pub fn connect(url: &str, timeout: Duration) -> Result<Remote> {
    let url = url.trim();
    if let Some(rest) = url.strip_prefix("git://") {
        return Ok(Remote::Smart(smart::SmartTransport::connect(rest, timeout)?));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Remote::Http(http::DumbHttpTransport::new(url, timeout)));
    }
    let path = url.strip_prefix("file://").unwrap_or(url);
    if path.starts_with("ssh://") || path.starts_with("git@") {
        return Err(Error::TransportError(format!("unsupported url: {url}")));
    }
    Ok(Remote::Local(local::LocalTransport::open(
        std::path::Path::new(path),
    )?))
}
