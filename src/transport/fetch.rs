//! fetch: refspec expansion, object acquisition (pack or object-by-object)
//! and remote-tracking ref updates

use std::collections::HashSet;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::hash::ObjectId;
use crate::object::Object;
use crate::refs;
use crate::repo::Repository;
use crate::transport::{connect, refspec::Refspec, Transport, DEFAULT_TIMEOUT};

/// one updated tracking ref
#[derive(Debug, PartialEq, Eq)]
pub struct RefUpdate {
    pub refname: String,
    pub old: Option<ObjectId>,
    pub new: ObjectId,
}

#[derive(Debug, Default)]
pub struct FetchResult {
    pub updates: Vec<RefUpdate>,
    pub objects_received: usize,
}

fn remote_url(repo: &Repository, remote: &str) -> Result<String> {
    repo.load_config()?
        .remote(remote)
        .map(|r| r.url)
        .ok_or_else(|| Error::Config(format!("remote '{remote}' is not configured")))
}

fn fetch_refspecs(repo: &Repository, remote: &str) -> Result<Vec<Refspec>> {
    let config = repo.load_config()?;
    let configured = config
        .remote(remote)
        .and_then(|r| r.fetch)
        .unwrap_or_else(|| format!("+refs/heads/*:refs/remotes/{remote}/*"));
    Ok(vec![Refspec::parse(&configured)?])
}

/// copy objects reachable from the wanted tips, one at a time, skipping
/// everything already present locally. used by local and dumb transports.
fn copy_objects(
    repo: &Repository,
    transport: &mut dyn Transport,
    tips: &[ObjectId],
) -> Result<usize> {
    let mut copied = 0;
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut stack: Vec<ObjectId> = tips.to_vec();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let object = if repo.odb().exists(&id) {
            repo.odb().load(&id)?
        } else {
            let (kind, content) = transport.get_object(&id)?;
            let object = Object::parse(kind, &content)?;
            repo.odb().store(&object)?;
            copied += 1;
            object
        };
        match object {
            Object::Commit(commit) => {
                stack.push(commit.tree);
                stack.extend(commit.parents);
            }
            Object::Tree(tree) => stack.extend(tree.entries().iter().map(|e| e.id)),
            Object::Tag(tag) => stack.push(tag.object),
            Object::Blob(_) => {}
        }
    }
    Ok(copied)
}

/// fetch from a named remote, updating its tracking refs
pub fn fetch(repo: &Repository, remote: &str, refspecs: &[String]) -> Result<FetchResult> {
    let url = remote_url(repo, remote)?;
    fetch_url(repo, &url, remote, refspecs)
}

/// fetch from an explicit URL (clone path); `remote` names the refspec set
pub fn fetch_url(
    repo: &Repository,
    url: &str,
    remote: &str,
    refspecs: &[String],
) -> Result<FetchResult> {
    let mut transport = connect(url, DEFAULT_TIMEOUT)?;
    let remote_refs = transport.list_refs()?;
    debug!(url, refs = remote_refs.len(), "fetch: listed remote refs");

    let specs: Vec<Refspec> = if refspecs.is_empty() {
        fetch_refspecs(repo, remote)?
    } else {
        refspecs
            .iter()
            .map(|s| Refspec::parse(s))
            .collect::<Result<_>>()?
    };

    // expand refspecs against the advertisement
    let src_names: Vec<String> = remote_refs.iter().map(|(name, _)| name.clone()).collect();
    let mut planned: Vec<(String, ObjectId, bool)> = Vec::new();
    for spec in &specs {
        for (src, dst) in spec.expand_all(&src_names) {
            let id = remote_refs
                .iter()
                .find(|(name, _)| *name == src)
                .map(|(_, id)| *id)
                .expect("expanded from advertisement");
            planned.push((dst, id, spec.force));
        }
    }
    if planned.is_empty() {
        return Ok(FetchResult::default());
    }

    let wants: Vec<ObjectId> = planned
        .iter()
        .map(|(_, id, _)| *id)
        .filter(|id| !repo.odb().exists(id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    let mut objects_received = 0;
    if !wants.is_empty() {
        // local haves for negotiation: current branch and tracking tips
        let mut haves = Vec::new();
        for prefix in [refs::HEADS_PREFIX, "refs/remotes/"] {
            for refname in refs::list_with_prefix(repo, prefix)? {
                if let Some(id) = refs::resolve(repo, &refname)? {
                    haves.push(id);
                }
            }
        }

        match transport.fetch_pack(&wants, &haves)? {
            Some(pack) if !pack.is_empty() => {
                objects_received = repo.odb().ingest_pack(pack)?;
            }
            Some(_) => {}
            None => {
                objects_received = copy_objects(repo, &mut transport, &wants)?;
            }
        }
    }

    // update tracking refs
    let mut updates = Vec::new();
    for (refname, new, _force) in planned {
        let old = refs::resolve(repo, &refname)?;
        if old == Some(new) {
            continue;
        }
        refs::update_ref(repo, &refname, &new, None, &format!("fetch: from {url}"))?;
        updates.push(RefUpdate { refname, old, new });
    }
    info!(updates = updates.len(), objects = objects_received, "fetch done");
    Ok(FetchResult {
        updates,
        objects_received,
    })
}
