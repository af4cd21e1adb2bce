//! smart protocol: upload-pack client over a pkt-line byte stream, plus a
//! minimal server loop good enough to serve our own client

use std::collections::HashSet;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::object::Kind;
use crate::odb::encode_pack;
use crate::refs::{self, HeadState, HEADS_PREFIX, TAGS_PREFIX};
use crate::repo::Repository;
use crate::transport::pkt::{self, Frame};
use crate::transport::Transport;

/// most haves sent during negotiation
const HAVE_BUDGET: usize = 32;

/// client side of `git://host[:port]/path`
pub struct SmartTransport {
    stream: TcpStream,
    path: String,
    refs_cache: Option<Vec<(String, ObjectId)>>,
}

impl SmartTransport {
    /// connect to `host[:port]/path` (rest of a git:// url)
    pub fn connect(rest: &str, timeout: Duration) -> Result<Self> {
        let (addr_part, path) = match rest.find('/') {
            Some(at) => (&rest[..at], &rest[at..]),
            None => (rest, "/"),
        };
        let addr = if addr_part.contains(':') {
            addr_part.to_string()
        } else {
            format!("{addr_part}:9418")
        };
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| Error::TransportError(format!("resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| Error::TransportError(format!("no address for {addr}")))?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout)
            .map_err(|e| Error::TransportError(format!("connect {addr}: {e}")))?;
        stream
            .set_read_timeout(Some(timeout))
            .and_then(|()| stream.set_write_timeout(Some(timeout)))
            .map_err(|e| Error::TransportError(format!("socket deadline: {e}")))?;
        Ok(Self {
            stream,
            path: path.to_string(),
            refs_cache: None,
        })
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .map_err(|e| Error::TransportError(format!("send: {e}")))
    }
}

impl Transport for SmartTransport {
    fn list_refs(&mut self) -> Result<Vec<(String, ObjectId)>> {
        if let Some(cached) = &self.refs_cache {
            return Ok(cached.clone());
        }
        let request = format!("git-upload-pack {}\0", self.path);
        let frame = pkt::encode(request.as_bytes())?;
        self.send(&frame)?;

        let frames = pkt::read_until_flush(&mut self.stream)?;
        let refs = pkt::parse_ref_advertisement(&frames);
        debug!(count = refs.len(), "smart advertisement");
        self.refs_cache = Some(refs.clone());
        Ok(refs)
    }

    fn get_object(&mut self, _id: &ObjectId) -> Result<(Kind, Vec<u8>)> {
        Err(Error::TransportError(
            "smart transport serves packs, not single objects".into(),
        ))
    }

    fn has_object(&mut self, _id: &ObjectId) -> Result<bool> {
        Err(Error::TransportError(
            "smart transport serves packs, not single objects".into(),
        ))
    }

    fn fetch_pack(&mut self, wants: &[ObjectId], haves: &[ObjectId]) -> Result<Option<Vec<u8>>> {
        if wants.is_empty() {
            return Ok(Some(Vec::new()));
        }
        for want in wants {
            self.send(&pkt::encode_line(&format!("want {want}"))?)?;
        }
        self.send(pkt::FLUSH)?;
        for have in haves.iter().take(HAVE_BUDGET) {
            self.send(&pkt::encode_line(&format!("have {have}"))?)?;
        }
        self.send(&pkt::encode_line("done")?)?;
        self.send(pkt::FLUSH)?;

        // ACK/NAK status line, then the raw pack stream
        match pkt::read_frame(&mut self.stream)? {
            Some(Frame::Data(status)) => {
                let text = String::from_utf8_lossy(&status);
                if !text.starts_with("ACK") && !text.starts_with("NAK") {
                    return Err(Error::TransportError(format!(
                        "unexpected negotiation reply: {}",
                        text.trim_end()
                    )));
                }
                debug!(reply = %text.trim_end(), "negotiation");
            }
            other => {
                return Err(Error::TransportError(format!(
                    "expected ACK/NAK, got {other:?}"
                )))
            }
        }

        let mut pack = Vec::new();
        self.stream
            .read_to_end(&mut pack)
            .map_err(|e| Error::TransportError(format!("receive pack: {e}")))?;
        let start = pack
            .windows(4)
            .position(|w| w == *b"PACK")
            .ok_or_else(|| Error::TransportError("no pack data received".into()))?;
        Ok(Some(pack.split_off(start)))
    }
}

/// serve one upload-pack session on an accepted connection.
///
/// protocol mirror of the client above: advertisement, wants, haves,
/// `done`, then ACK/NAK and a whole-object pack.
pub fn serve_upload_pack(repo: &Repository, stream: &mut TcpStream) -> Result<()> {
    // request line: "git-upload-pack <path>\0..." (path already chosen by caller)
    match pkt::read_frame(stream)? {
        Some(Frame::Data(request)) => {
            let text = String::from_utf8_lossy(&request);
            if !text.starts_with("git-upload-pack ") {
                return Err(Error::TransportError(format!(
                    "unexpected service request: {text}"
                )));
            }
        }
        other => {
            return Err(Error::TransportError(format!(
                "expected service request, got {other:?}"
            )))
        }
    }

    // advertisement
    let mut advertised = Vec::new();
    if let HeadState::Symbolic(target) = refs::read_head(repo)? {
        if let Some(id) = refs::resolve(repo, &target)? {
            advertised.push(("HEAD".to_string(), id));
        }
    }
    for prefix in [HEADS_PREFIX, TAGS_PREFIX] {
        for refname in refs::list_with_prefix(repo, prefix)? {
            if let Some(id) = refs::resolve(repo, &refname)? {
                advertised.push((refname, id));
            }
        }
    }
    let mut out = Vec::new();
    for (refname, id) in &advertised {
        out.extend_from_slice(&pkt::encode_line(&format!("{id} {refname}"))?);
    }
    out.extend_from_slice(pkt::FLUSH);
    stream
        .write_all(&out)
        .map_err(|e| Error::TransportError(format!("advertise: {e}")))?;

    // wants, haves, done
    let mut wants = Vec::new();
    let mut haves = Vec::new();
    loop {
        match pkt::read_frame(stream)? {
            Some(Frame::Data(payload)) => {
                let line = String::from_utf8_lossy(&payload);
                let line = line.trim_end();
                if let Some(sha) = line.strip_prefix("want ") {
                    wants.push(ObjectId::from_hex(sha.split(' ').next().unwrap_or(sha))?);
                } else if let Some(sha) = line.strip_prefix("have ") {
                    haves.push(ObjectId::from_hex(sha)?);
                } else if line == "done" {
                    break;
                }
            }
            Some(Frame::Flush) | Some(Frame::Delim) => continue,
            None => return Err(Error::TransportError("client hung up".into())),
        }
    }

    // negotiation result: last common have wins
    let common: Vec<ObjectId> = haves
        .iter()
        .filter(|id| repo.odb().exists(id))
        .copied()
        .collect();
    let reply = match common.last() {
        Some(id) => format!("ACK {id} common"),
        None => "NAK".to_string(),
    };
    stream
        .write_all(&pkt::encode_line(&reply)?)
        .map_err(|e| Error::TransportError(format!("ack: {e}")))?;

    // objects the client wants and does not have
    let want_set = graph::reachable_objects(repo, &wants)?;
    let have_set: HashSet<ObjectId> = graph::reachable_objects(repo, &common)?;
    let mut ids: Vec<ObjectId> = want_set.difference(&have_set).copied().collect();
    ids.sort();
    debug!(objects = ids.len(), "serving pack");

    let (pack, _) = encode_pack(&ids, |id| repo.odb().load_content(id))?;
    stream
        .write_all(&pack)
        .map_err(|e| Error::TransportError(format!("send pack: {e}")))?;
    stream
        .flush()
        .map_err(|e| Error::TransportError(format!("flush: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odb::Pack;
    use crate::ops::add::add_path;
    use crate::ops::commit::{commit, CommitOutcome};
    use std::net::TcpListener;
    use tempfile::tempdir;

    fn repo_with_commits() -> (tempfile::TempDir, Repository, ObjectId, ObjectId) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"A\n").unwrap();
        add_path(&repo, "a.txt", false).unwrap();
        let c1 = commit_created(&repo, "c1");
        std::fs::write(dir.path().join("a.txt"), b"B\n").unwrap();
        add_path(&repo, "a.txt", false).unwrap();
        let c2 = commit_created(&repo, "c2");
        (dir, repo, c1, c2)
    }

    fn commit_created(repo: &Repository, msg: &str) -> ObjectId {
        match commit(repo, Some(msg)).unwrap() {
            CommitOutcome::Created(id) => id,
            _ => panic!("expected commit"),
        }
    }

    #[test]
    fn test_client_server_roundtrip() {
        let (dir, _repo, c1, c2) = repo_with_commits();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server_path = dir.path().to_path_buf();
        let server = std::thread::spawn(move || {
            // Repository handles are single-threaded; the server thread
            // opens its own
            let repo = Repository::open(&server_path).unwrap();
            let (mut stream, _) = listener.accept().unwrap();
            serve_upload_pack(&repo, &mut stream).unwrap();
        });

        let mut client = SmartTransport::connect(
            &format!("127.0.0.1:{}/", addr.port()),
            Duration::from_secs(5),
        )
        .unwrap();
        let refs = client.list_refs().unwrap();
        assert!(refs.contains(&("refs/heads/main".to_string(), c2)));

        let pack_bytes = client.fetch_pack(&[c2], &[]).unwrap().unwrap();
        server.join().unwrap();

        let pack = Pack::parse(pack_bytes).unwrap();
        // full history: 2 commits, 2 trees, 2 blobs
        assert_eq!(pack.object_count(), 6);
        let _ = c1;
    }

    #[test]
    fn test_negotiation_trims_pack() {
        let (dir, _repo, c1, c2) = repo_with_commits();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server_path = dir.path().to_path_buf();
        let server = std::thread::spawn(move || {
            let repo = Repository::open(&server_path).unwrap();
            let (mut stream, _) = listener.accept().unwrap();
            serve_upload_pack(&repo, &mut stream).unwrap();
        });

        let mut client = SmartTransport::connect(
            &format!("127.0.0.1:{}/x", addr.port()),
            Duration::from_secs(5),
        )
        .unwrap();
        client.list_refs().unwrap();
        // claiming c1 shrinks the pack to the new commit, tree, blob
        let pack_bytes = client.fetch_pack(&[c2], &[c1]).unwrap().unwrap();
        server.join().unwrap();

        let pack = Pack::parse(pack_bytes).unwrap();
        assert_eq!(pack.object_count(), 3);
    }
}
