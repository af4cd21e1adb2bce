//! clone: init, add origin, fetch, point HEAD at the remote default
//! branch, check out

use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::graph;
use crate::refs::{self, HeadState, HEADS_PREFIX};
use crate::repo::{Repository, DEFAULT_BRANCH};
use crate::transport::{connect, fetch::fetch_url, DEFAULT_TIMEOUT, Transport};
use crate::worktree::{self, CheckoutPolicy};

/// clone a source URL (local path, file://, http(s)://, git://) into dest
pub fn clone(source: &str, dest: &Path) -> Result<Repository> {
    if dest.exists() && dest.read_dir().map(|mut it| it.next().is_some()).unwrap_or(false) {
        return Err(Error::Config(format!(
            "destination {} exists and is not empty",
            dest.display()
        )));
    }
    std::fs::create_dir_all(dest).map_err(|source_err| Error::Io {
        path: dest.to_path_buf(),
        source: source_err,
    })?;

    let repo = Repository::init(dest)?;
    let mut config = repo.load_config()?;
    config.add_remote("origin", source)?;
    repo.save_config(&config)?;

    fetch_url(&repo, source, "origin", &[])?;

    // default branch: follow the remote's HEAD when advertised, else main
    let default_branch = {
        let mut transport = connect(source, DEFAULT_TIMEOUT)?;
        let advertised = transport.list_refs()?;
        let head_id = advertised
            .iter()
            .find(|(name, _)| name == "HEAD")
            .map(|(_, id)| *id);
        head_id
            .and_then(|id| {
                advertised
                    .iter()
                    .find(|(name, target)| name.starts_with(HEADS_PREFIX) && *target == id)
                    .map(|(name, _)| name[HEADS_PREFIX.len()..].to_string())
            })
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    };

    let tracking = format!("refs/remotes/origin/{default_branch}");
    let Some(tip) = refs::resolve(&repo, &tracking)? else {
        // empty source repository: leave the unborn branch in place
        return Ok(repo);
    };

    let branch_ref = format!("{HEADS_PREFIX}{default_branch}");
    refs::update_ref(&repo, &branch_ref, &tip, None, "clone: from remote")?;
    refs::update_head(
        &repo,
        &HeadState::Symbolic(branch_ref),
        &format!("clone: checkout {default_branch}"),
    )?;

    let tree = graph::load_commit(&repo, &tip)?.tree;
    worktree::checkout_tree(&repo, &tree, CheckoutPolicy::Force)?;
    info!(source, dest = %dest.display(), "cloned");
    Ok(repo)
}
