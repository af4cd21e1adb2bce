//! branch management

use crate::error::{Error, Result};
use crate::refs::{self, HEADS_PREFIX};
use crate::repo::Repository;
use crate::revision;

/// a branch row for listings
#[derive(Debug, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub is_current: bool,
}

pub fn list(repo: &Repository) -> Result<Vec<BranchInfo>> {
    let current = refs::current_branch(repo)?;
    Ok(refs::list_branches(repo)?
        .into_iter()
        .map(|name| BranchInfo {
            is_current: current.as_deref() == Some(&name),
            name,
        })
        .collect())
}

/// create a branch at a start point (default HEAD)
pub fn create(repo: &Repository, name: &str, start: Option<&str>) -> Result<()> {
    refs::validate_ref_name(name)?;
    let refname = format!("{HEADS_PREFIX}{name}");
    if refs::exists(repo, &refname) {
        return Err(Error::RefUpdateRejected {
            refname,
            reason: "branch already exists".into(),
        });
    }
    let id = match start {
        Some(rev) => revision::rev_parse_commit(repo, rev)?,
        None => refs::head_id(repo)?
            .ok_or_else(|| Error::NoCommitsYet("main".into()))?,
    };
    let from = start.unwrap_or("HEAD");
    refs::update_ref(repo, &refname, &id, None, &format!("branch: Created from {from}"))
}

/// delete a branch; the checked-out branch is protected
pub fn delete(repo: &Repository, name: &str) -> Result<()> {
    if refs::current_branch(repo)?.as_deref() == Some(name) {
        return Err(Error::RefUpdateRejected {
            refname: format!("{HEADS_PREFIX}{name}"),
            reason: "cannot delete the checked-out branch".into(),
        });
    }
    refs::delete_ref(repo, &format!("{HEADS_PREFIX}{name}"))
}
