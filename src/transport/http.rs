//! dumb HTTP transport: plain GETs against a repository served as static
//! files (`HEAD`, `info/refs`, `packed-refs`, `objects/aa/bb...`)

use std::collections::BTreeMap;
use std::time::Duration;

use curl::easy::Easy;
use tracing::debug;

use crate::error::{Error, Result};
use crate::hash::{is_full_hex, ObjectId};
use crate::object::{split_frame, Kind};
use crate::odb::loose::inflate;
use crate::transport::Transport;

pub struct DumbHttpTransport {
    base_url: String,
    timeout: Duration,
    refs_cache: Option<Vec<(String, ObjectId)>>,
}

impl DumbHttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: format!("{}/.git", base_url.trim_end_matches('/')),
            timeout,
            refs_cache: None,
        }
    }

    /// GET a path under the repository; Ok(None) on 404
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/{path}", self.base_url);
        let mut easy = Easy::new();
        let wrap = |e: curl::Error| Error::TransportError(format!("{url}: {e}"));
        easy.url(&url).map_err(wrap)?;
        easy.timeout(self.timeout).map_err(wrap)?;
        easy.follow_location(true).map_err(wrap)?;
        easy.fail_on_error(false).map_err(wrap)?;

        let mut body = Vec::new();
        {
            let mut handle = easy.transfer();
            handle
                .write_function(|chunk| {
                    body.extend_from_slice(chunk);
                    Ok(chunk.len())
                })
                .map_err(wrap)?;
            handle.perform().map_err(wrap)?;
        }
        let code = easy.response_code().map_err(wrap)?;
        debug!(url, code, bytes = body.len(), "dumb-http get");
        match code {
            200 => Ok(Some(body)),
            404 => Ok(None),
            other => Err(Error::TransportError(format!("{url}: HTTP {other}"))),
        }
    }

    fn parse_refs_listing(data: &[u8], refs: &mut BTreeMap<String, ObjectId>) {
        for line in String::from_utf8_lossy(data).lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            let Some((sha, refname)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            if let Ok(id) = ObjectId::from_hex(sha.trim()) {
                refs.insert(refname.trim().to_string(), id);
            }
        }
    }
}

impl Transport for DumbHttpTransport {
    fn list_refs(&mut self) -> Result<Vec<(String, ObjectId)>> {
        if let Some(cached) = &self.refs_cache {
            return Ok(cached.clone());
        }
        let mut refs = BTreeMap::new();

        // info/refs (tab-separated) and packed-refs share a line shape
        if let Some(body) = self.get("info/refs")? {
            Self::parse_refs_listing(&body, &mut refs);
        }
        if let Some(body) = self.get("packed-refs")? {
            Self::parse_refs_listing(&body, &mut refs);
        }

        if let Some(body) = self.get("HEAD")? {
            let head = String::from_utf8_lossy(&body).trim().to_string();
            if let Some(target) = head.strip_prefix("ref: ") {
                let target = target.trim().to_string();
                if !refs.contains_key(&target) {
                    if let Some(body) = self.get(&target)? {
                        let sha = String::from_utf8_lossy(&body).trim().to_string();
                        if let Ok(id) = ObjectId::from_hex(&sha) {
                            refs.insert(target.clone(), id);
                        }
                    }
                }
                if let Some(id) = refs.get(&target).copied() {
                    refs.insert("HEAD".to_string(), id);
                }
            } else if is_full_hex(&head) {
                refs.insert("HEAD".to_string(), ObjectId::from_hex(&head)?);
            }
        }

        let out: Vec<(String, ObjectId)> = refs.into_iter().collect();
        self.refs_cache = Some(out.clone());
        Ok(out)
    }

    fn get_object(&mut self, id: &ObjectId) -> Result<(Kind, Vec<u8>)> {
        let (dir, file) = id.to_path_components();
        let body = self
            .get(&format!("objects/{dir}/{file}"))?
            .ok_or_else(|| Error::ObjectNotFound(id.to_hex()))?;
        let framed = inflate(&body)
            .map_err(|e| Error::TransportError(format!("object {id}: bad zlib: {e}")))?;
        let (kind, content) = split_frame(&framed)?;
        Ok((kind, content.to_vec()))
    }

    fn has_object(&mut self, id: &ObjectId) -> Result<bool> {
        let (dir, file) = id.to_path_components();
        Ok(self.get(&format!("objects/{dir}/{file}"))?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refs_listing() {
        let mut refs = BTreeMap::new();
        let body = b"# pack-refs\n\
ce013625030ba8dba906f756967f9e9ca394464a refs/heads/main\n\
^e69de29bb2d1d6434b8b29ae775ad8c2e48c5391\n\
e69de29bb2d1d6434b8b29ae775ad8c2e48c5391\trefs/tags/v1\n";
        DumbHttpTransport::parse_refs_listing(body, &mut refs);
        assert_eq!(refs.len(), 2);
        assert!(refs.contains_key("refs/heads/main"));
        assert!(refs.contains_key("refs/tags/v1"));
    }

    #[test]
    fn test_base_url_normalized() {
        let t = DumbHttpTransport::new("http://example.com/repo/", DEFAULT);
        assert_eq!(t.base_url, "http://example.com/repo/.git");
    }

    const DEFAULT: Duration = Duration::from_secs(5);
}
