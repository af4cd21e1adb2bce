//! merge policy: fast-forward when possible, three-way otherwise

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::ObjectId;
use crate::index::Index;
use crate::merge as tree_merge;
use crate::object::{Commit, Object};
use crate::ops::commit::{clear_merge_state, write_merge_state};
use crate::ops::identity;
use crate::ops::status;
use crate::refs::{self, HeadState, HEADS_PREFIX};
use crate::repo::Repository;
use crate::revision;
use crate::worktree::{self, CheckoutPolicy};

#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    /// always create a merge commit, even when fast-forward is possible
    pub no_ff: bool,
    /// refuse anything that is not a fast-forward
    pub ff_only: bool,
    /// merge despite a dirty working tree
    pub force: bool,
    /// stop before committing a clean three-way merge
    pub no_commit: bool,
    pub message: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    AlreadyUpToDate,
    FastForward { from: Option<ObjectId>, to: ObjectId },
    Merged(ObjectId),
    /// clean three-way staged, commit withheld (`no_commit`)
    Staged,
}

/// merge a revision into HEAD.
///
/// conflicts leave MERGE_HEAD/MERGE_MSG and stage-1/2/3 index entries
/// behind and surface as `Error::MergeConflict`.
pub fn merge(repo: &Repository, name: &str, options: &MergeOptions) -> Result<MergeOutcome> {
    let theirs = revision::rev_parse_commit(repo, name)?;
    let head = refs::head_id(repo)?;

    if !options.force && status::is_dirty(repo)? {
        return Err(Error::DirtyWorkingTree);
    }

    // unborn branch: adopt their history wholesale
    let Some(head_id) = head else {
        fast_forward_to(repo, name, None, &theirs)?;
        return Ok(MergeOutcome::FastForward {
            from: None,
            to: theirs,
        });
    };

    if theirs == head_id || graph::is_ancestor(repo, &theirs, &head_id)? {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }

    if graph::is_ancestor(repo, &head_id, &theirs)? && !options.no_ff {
        fast_forward_to(repo, name, Some(&head_id), &theirs)?;
        return Ok(MergeOutcome::FastForward {
            from: Some(head_id),
            to: theirs,
        });
    }

    if options.ff_only {
        return Err(Error::RefUpdateRejected {
            refname: "HEAD".into(),
            reason: format!("cannot fast-forward to {name}"),
        });
    }

    let base = graph::merge_base(repo, &head_id, &theirs)?;
    debug!(base = ?base.map(|id| id.short()), "three-way merge");
    let base_tree = match base {
        Some(id) => Some(graph::load_commit(repo, &id)?.tree),
        None => None,
    };
    let head_tree = graph::load_commit(repo, &head_id)?.tree;
    let their_tree = graph::load_commit(repo, &theirs)?.tree;

    let branch = refs::current_branch(repo)?;
    let message = options.message.clone().unwrap_or_else(|| match &branch {
        Some(branch) => format!("Merge {name} into {branch}"),
        None => format!("Merge {name}"),
    });

    let result = tree_merge::merge_trees(
        repo,
        base_tree.as_ref(),
        Some(&head_tree),
        Some(&their_tree),
        "HEAD",
        name,
    )?;
    tree_merge::apply_merge(repo, &result)?;

    if !result.is_clean() {
        write_merge_state(repo, &theirs, &message)?;
        return Err(Error::MergeConflict(result.conflict_paths()));
    }

    if options.no_commit {
        write_merge_state(repo, &theirs, &message)?;
        return Ok(MergeOutcome::Staged);
    }

    let index = Index::load(repo)?;
    let tree = worktree::tree_from_index(repo, &index)?;
    let author = identity::author_ident(repo)?;
    let committer = identity::committer_ident(repo)?;
    let commit = Commit::new(tree, vec![head_id, theirs], author, committer, message.as_str());
    let merge_id = repo.odb().store(&Object::Commit(commit))?;

    let reflog_message = format!("merge {name}: Merge made by 3-way merge");
    match refs::read_head(repo)? {
        HeadState::Symbolic(refname) => {
            refs::update_ref(repo, &refname, &merge_id, Some(&head_id), &reflog_message)?;
        }
        HeadState::Detached(_) => {
            refs::update_head(repo, &HeadState::Detached(merge_id), &reflog_message)?;
        }
    }
    clear_merge_state(repo);
    Ok(MergeOutcome::Merged(merge_id))
}

/// advance HEAD (and its branch) to target, refreshing tree and index
fn fast_forward_to(
    repo: &Repository,
    name: &str,
    old: Option<&ObjectId>,
    target: &ObjectId,
) -> Result<()> {
    let tree = graph::load_commit(repo, target)?.tree;
    worktree::checkout_tree(repo, &tree, CheckoutPolicy::Force)?;
    let message = format!("merge {name}: Fast-forward");
    match refs::read_head(repo)? {
        HeadState::Symbolic(refname) if refname.starts_with(HEADS_PREFIX) => {
            refs::update_ref(repo, &refname, target, old, &message)?;
        }
        _ => {
            refs::update_head(repo, &HeadState::Detached(*target), &message)?;
        }
    }
    Ok(())
}
