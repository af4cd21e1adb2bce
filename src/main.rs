//! mingit CLI - git-compatible version control

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mingit::ops::{self, CheckoutOutcome, CommitOutcome, MergeOptions, MergeOutcome, ResetMode};
use mingit::transport;
use mingit::{graph, object, refs, revision, Error, Object, Repository};

#[derive(Parser)]
#[command(name = "mingit")]
#[command(about = "byte-compatible git core: objects, index, refs, packs, sync")]
#[command(version)]
struct Cli {
    /// repository path
    #[arg(short = 'C', long, default_value = ".")]
    repo: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// initialize a new repository
    Init {
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// stage files
    Add {
        paths: Vec<String>,

        /// add ignored files too
        #[arg(short, long)]
        force: bool,
    },

    /// remove files from the index (and working tree)
    Rm {
        paths: Vec<String>,

        /// only remove from the index
        #[arg(long)]
        cached: bool,

        /// remove directories recursively
        #[arg(short, long)]
        recursive: bool,
    },

    /// restore working tree files (or unstage with --staged)
    Restore {
        paths: Vec<String>,

        #[arg(long)]
        staged: bool,

        /// restore from this revision instead of the index
        #[arg(long)]
        source: Option<String>,
    },

    /// create a commit from the index
    Commit {
        #[arg(short, long)]
        message: Option<String>,
    },

    /// show working tree status
    Status,

    /// show commit history (first-parent)
    Log {
        rev: Option<String>,

        #[arg(short = 'n', long)]
        max_count: Option<usize>,

        #[arg(long)]
        oneline: bool,
    },

    /// list commits reachable from a revision
    RevList {
        rev: Option<String>,

        #[arg(long)]
        all: bool,

        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },

    /// list, create or delete branches
    Branch {
        name: Option<String>,

        #[arg(short = 'd', long)]
        delete: bool,

        /// start point (defaults to HEAD)
        start: Option<String>,
    },

    /// switch branches or detach at a commit
    Checkout {
        target: String,

        /// create the branch first
        #[arg(short = 'b')]
        create: bool,

        #[arg(short, long)]
        force: bool,
    },

    /// merge a branch or revision into HEAD
    Merge {
        name: String,

        #[arg(long)]
        no_ff: bool,

        #[arg(long)]
        ff_only: bool,

        #[arg(long)]
        no_commit: bool,

        #[arg(short, long)]
        message: Option<String>,
    },

    /// apply the changes of one commit onto HEAD
    CherryPick {
        rev: Option<String>,

        #[arg(long = "continue")]
        cont: bool,

        #[arg(long)]
        abort: bool,
    },

    /// replay the current branch onto an upstream
    Rebase {
        upstream: Option<String>,

        #[arg(long = "continue")]
        cont: bool,

        #[arg(long)]
        abort: bool,
    },

    /// stash the index and working tree
    Stash {
        #[command(subcommand)]
        action: Option<StashAction>,
    },

    /// manage tags
    Tag {
        name: Option<String>,

        /// annotated tag
        #[arg(short = 'a')]
        annotated: bool,

        #[arg(short, long)]
        message: Option<String>,

        #[arg(short = 'd', long)]
        delete: bool,

        #[arg(short, long)]
        force: bool,

        /// object to tag (defaults to HEAD)
        target: Option<String>,
    },

    /// move HEAD (soft), plus index (mixed), plus working tree (hard)
    Reset {
        rev: String,

        #[arg(long)]
        soft: bool,

        #[arg(long)]
        mixed: bool,

        #[arg(long)]
        hard: bool,
    },

    /// show changes (working tree vs index, or --staged)
    Diff {
        #[arg(long)]
        staged: bool,
    },

    /// show the reflog
    Reflog {
        #[arg(default_value = "HEAD")]
        reference: String,

        #[arg(short = 'n', long)]
        max_count: Option<usize>,
    },

    /// read or write configuration
    Config {
        key: Option<String>,
        value: Option<String>,

        #[arg(long)]
        unset: bool,

        #[arg(long)]
        list: bool,
    },

    /// manage remotes
    Remote {
        #[command(subcommand)]
        action: Option<RemoteAction>,
    },

    /// fetch objects and tracking refs from a remote
    Fetch {
        #[arg(default_value = "origin")]
        remote: String,

        refspecs: Vec<String>,
    },

    /// push a revision to a remote ref
    Push {
        #[arg(default_value = "origin")]
        remote: String,

        /// source revision (defaults to HEAD)
        src: Option<String>,

        /// destination ref (defaults to the current branch)
        dst: Option<String>,

        #[arg(short, long)]
        force: bool,
    },

    /// clone a repository
    Clone {
        source: String,
        dest: PathBuf,
    },

    /// pack reachable objects, optionally pruning loose copies
    Gc {
        #[arg(long)]
        prune: bool,
    },

    /// print an object's type or content
    CatFile {
        /// -t prints the type, -p pretty-prints
        #[arg(short = 't', conflicts_with = "pretty")]
        kind: bool,

        #[arg(short = 'p')]
        pretty: bool,

        object: String,
    },

    /// hash a file as a blob, optionally writing it to the odb
    HashObject {
        path: String,

        #[arg(short = 'w')]
        write: bool,
    },

    /// list a tree's entries
    LsTree {
        tree_ish: String,

        #[arg(short, long)]
        recursive: bool,

        #[arg(long)]
        name_only: bool,
    },

    /// build a tree from the index and print its id
    WriteTree,

    /// create a commit object from a tree (no ref updates)
    CommitTree {
        tree: String,

        #[arg(short = 'p')]
        parents: Vec<String>,

        #[arg(short, long)]
        message: String,
    },

    /// resolve a revision expression
    RevParse {
        rev: String,

        #[arg(long)]
        short: bool,
    },

    /// best common ancestor of two commits
    MergeBase {
        a: String,
        b: String,
    },

    /// print refs with their targets
    ShowRef {
        #[arg(long)]
        heads: bool,

        #[arg(long)]
        tags: bool,
    },

    /// point HEAD at a branch
    SymbolicRef {
        name: String,
        refname: String,
    },

    /// update a ref, optionally checking its old value
    UpdateRef {
        refname: String,
        new: String,
        old: Option<String>,
    },

    /// report whether an object's signature verifies
    Verify {
        rev: String,
    },
}

#[derive(Subcommand)]
enum StashAction {
    Push {
        #[arg(short, long)]
        message: Option<String>,
    },
    List,
    Apply {
        reference: Option<String>,
    },
    Pop {
        reference: Option<String>,
    },
}

#[derive(Subcommand)]
enum RemoteAction {
    Add { name: String, url: String },
    Remove { name: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn open_repo(cli_repo: &PathBuf) -> mingit::Result<Repository> {
    Repository::discover(cli_repo)
}

fn run(cli: Cli) -> mingit::Result<()> {
    match cli.command {
        Commands::Init { path } => {
            let repo = Repository::init(&path)?;
            println!(
                "Initialized empty Git repository in {}",
                repo.git_dir().display()
            );
        }

        Commands::Add { paths, force } => {
            let repo = open_repo(&cli.repo)?;
            for path in paths {
                for added in ops::add_path(&repo, &path, force)? {
                    println!("Added {added}");
                }
            }
        }

        Commands::Rm {
            paths,
            cached,
            recursive,
        } => {
            let repo = open_repo(&cli.repo)?;
            for removed in ops::rm_paths(&repo, &paths, cached, recursive)? {
                println!("rm '{removed}'");
            }
        }

        Commands::Restore {
            paths,
            staged,
            source,
        } => {
            let repo = open_repo(&cli.repo)?;
            ops::restore(&repo, &paths, staged, source.as_deref())?;
        }

        Commands::Commit { message } => {
            let repo = open_repo(&cli.repo)?;
            match ops::commit(&repo, message.as_deref())? {
                CommitOutcome::Created(id) => {
                    let branch = refs::current_branch(&repo)?;
                    match branch {
                        Some(branch) => {
                            println!("Created commit {} on branch {branch}", id.short())
                        }
                        None => println!("Created commit {} (detached HEAD)", id.short()),
                    }
                }
                CommitOutcome::NothingToCommit => {
                    println!("nothing to commit, working tree clean")
                }
            }
        }

        Commands::Status => {
            let repo = open_repo(&cli.repo)?;
            let st = ops::status(&repo)?;
            match (&st.branch, st.head) {
                (Some(branch), _) => println!("On branch {branch}"),
                (None, Some(head)) => println!("HEAD detached at {}", head.short()),
                (None, None) => println!("No commits yet"),
            }
            if !st.unmerged.is_empty() {
                println!("\nUnmerged paths:");
                for path in &st.unmerged {
                    println!("  both modified:   {path}");
                }
            }
            if !st.staged_new.is_empty() || !st.staged_modified.is_empty() || !st.staged_deleted.is_empty() {
                println!("\nChanges to be committed:");
                for path in &st.staged_new {
                    println!("  new file:   {path}");
                }
                for path in &st.staged_modified {
                    println!("  modified:   {path}");
                }
                for path in &st.staged_deleted {
                    println!("  deleted:    {path}");
                }
            }
            if !st.unstaged.is_empty() {
                println!("\nChanges not staged for commit:");
                for path in &st.unstaged {
                    println!("  modified:   {path}");
                }
            }
            if !st.deleted.is_empty() {
                println!("\nDeleted files:");
                for path in &st.deleted {
                    println!("  deleted:    {path}");
                }
            }
            if !st.untracked.is_empty() {
                println!("\nUntracked files:");
                for path in &st.untracked {
                    println!("  {path}");
                }
            }
            if st.is_clean() {
                println!("\nnothing to commit, working tree clean");
            }
        }

        Commands::Log {
            rev,
            max_count,
            oneline,
        } => {
            let repo = open_repo(&cli.repo)?;
            let limit = max_count.or(if oneline { None } else { Some(10) });
            for entry in ops::log(&repo, rev.as_deref(), limit)? {
                if oneline {
                    println!("{} {}", entry.id.short(), entry.commit.subject());
                } else {
                    println!("commit {}", entry.id);
                    println!("Author: {}", entry.commit.author.who);
                    println!(
                        "Date:   {} {}",
                        entry.commit.author.timestamp, entry.commit.author.tz_offset
                    );
                    println!();
                    for line in entry.commit.message.lines() {
                        println!("    {line}");
                    }
                    println!();
                }
            }
        }

        Commands::RevList {
            rev,
            all,
            max_count,
        } => {
            let repo = open_repo(&cli.repo)?;
            for id in ops::rev_list(&repo, rev.as_deref(), all, max_count)? {
                println!("{id}");
            }
        }

        Commands::Branch {
            name,
            delete,
            start,
        } => {
            let repo = open_repo(&cli.repo)?;
            match name {
                None => {
                    for branch in ops::branch::list(&repo)? {
                        let mark = if branch.is_current { "* " } else { "  " };
                        println!("{mark}{}", branch.name);
                    }
                }
                Some(name) if delete => {
                    ops::branch::delete(&repo, &name)?;
                    println!("Deleted branch {name}");
                }
                Some(name) => {
                    ops::branch::create(&repo, &name, start.as_deref())?;
                    println!("Created branch {name}");
                }
            }
        }

        Commands::Checkout {
            target,
            create,
            force,
        } => {
            let repo = open_repo(&cli.repo)?;
            match ops::checkout(&repo, &target, create, force)? {
                CheckoutOutcome::CreatedBranch { name, .. } => {
                    println!("Switched to a new branch '{name}'")
                }
                CheckoutOutcome::SwitchedBranch { name, .. } => {
                    println!("Switched to branch '{name}'")
                }
                CheckoutOutcome::Detached(id) => {
                    println!("HEAD is now at {}", id.short())
                }
            }
        }

        Commands::Merge {
            name,
            no_ff,
            ff_only,
            no_commit,
            message,
        } => {
            let repo = open_repo(&cli.repo)?;
            let options = MergeOptions {
                no_ff,
                ff_only,
                no_commit,
                force: false,
                message,
            };
            match ops::merge(&repo, &name, &options)? {
                MergeOutcome::AlreadyUpToDate => println!("Already up to date."),
                MergeOutcome::FastForward { from, to } => {
                    let old = from
                        .map(|id| id.short())
                        .unwrap_or_else(|| "0".repeat(7));
                    println!("Updating {old}..{}", to.short());
                    println!("Fast-forward");
                }
                MergeOutcome::Merged(id) => {
                    println!("Merge made by 3-way merge. New commit {}", id.short())
                }
                MergeOutcome::Staged => {
                    println!("Merge staged; run commit to conclude the merge.")
                }
            }
        }

        Commands::CherryPick { rev, cont, abort } => {
            let repo = open_repo(&cli.repo)?;
            if cont {
                let id = ops::cherry_pick_continue(&repo)?;
                println!("Created commit {} (cherry-pick continued)", id.short());
            } else if abort {
                ops::cherry_pick_abort(&repo)?;
                println!("Cherry-pick aborted.");
            } else {
                let rev = rev.ok_or_else(|| Error::InvalidRevision("<rev> required".into()))?;
                let id = ops::cherry_pick(&repo, &rev)?;
                println!("Created commit {}", id.short());
            }
        }

        Commands::Rebase {
            upstream,
            cont,
            abort,
        } => {
            let repo = open_repo(&cli.repo)?;
            if cont {
                report_rebase(ops::rebase_continue(&repo)?);
            } else if abort {
                ops::rebase_abort(&repo)?;
                println!("Rebase aborted.");
            } else {
                let upstream =
                    upstream.ok_or_else(|| Error::InvalidRevision("<upstream> required".into()))?;
                report_rebase(ops::rebase(&repo, &upstream)?);
            }
        }

        Commands::Stash { action } => {
            let repo = open_repo(&cli.repo)?;
            match action.unwrap_or(StashAction::Push { message: None }) {
                StashAction::Push { message } => {
                    let id = ops::stash_push(&repo, message.as_deref())?;
                    println!("Saved working directory and index state ({})", id.short());
                }
                StashAction::List => {
                    for (label, message) in ops::stash_list(&repo)? {
                        println!("{label}: {message}");
                    }
                }
                StashAction::Apply { reference } => {
                    ops::stash_apply(&repo, reference.as_deref())?;
                }
                StashAction::Pop { reference } => {
                    ops::stash_pop(&repo, reference.as_deref())?;
                }
            }
        }

        Commands::Tag {
            name,
            annotated,
            message,
            delete,
            force,
            target,
        } => {
            let repo = open_repo(&cli.repo)?;
            match name {
                None => {
                    for tag in ops::tag::list(&repo)? {
                        println!("{tag}");
                    }
                }
                Some(name) if delete => {
                    ops::tag::delete(&repo, &name)?;
                    println!("Deleted tag {name}");
                }
                Some(name) if annotated => {
                    let message = message
                        .ok_or_else(|| Error::Config("annotated tags need a message".into()))?;
                    ops::tag::create_annotated(&repo, &name, target.as_deref(), &message, force)?;
                }
                Some(name) => {
                    ops::tag::create_lightweight(&repo, &name, target.as_deref(), force)?;
                }
            }
        }

        Commands::Reset {
            rev,
            soft,
            mixed,
            hard,
        } => {
            let repo = open_repo(&cli.repo)?;
            let mode = match (soft, mixed, hard) {
                (true, false, false) => ResetMode::Soft,
                (false, false, true) => ResetMode::Hard,
                _ => ResetMode::Mixed,
            };
            let id = ops::reset(&repo, mode, &rev)?;
            println!("HEAD is now at {}", id.short());
        }

        Commands::Diff { staged } => {
            let repo = open_repo(&cli.repo)?;
            let diffs = if staged {
                ops::diff_staged(&repo)?
            } else {
                ops::diff_worktree(&repo)?
            };
            for diff in diffs {
                print!("{}", diff.text);
            }
        }

        Commands::Reflog {
            reference,
            max_count,
        } => {
            let repo = open_repo(&cli.repo)?;
            let refname = if reference == "HEAD" || reference.starts_with("refs/") {
                reference
            } else {
                format!("refs/heads/{reference}")
            };
            for (short, label, message) in
                ops::log::reflog_entries(&repo, &refname, max_count.or(Some(10)))?
            {
                println!("{short} {label}: {message}");
            }
        }

        Commands::Config {
            key,
            value,
            unset,
            list,
        } => {
            let repo = open_repo(&cli.repo)?;
            let mut config = repo.load_config()?;
            if list {
                for (key, value) in config.list() {
                    println!("{key}={value}");
                }
            } else if unset {
                let key = key.ok_or_else(|| Error::Config("--unset needs a key".into()))?;
                if !config.unset(&key) {
                    return Err(Error::Config(format!("key not found: {key}")));
                }
                repo.save_config(&config)?;
            } else {
                let key = key.ok_or_else(|| Error::Config("a key is required".into()))?;
                match value {
                    Some(value) => {
                        config.set(&key, value)?;
                        repo.save_config(&config)?;
                    }
                    None => match config.get(&key) {
                        Some(value) => println!("{value}"),
                        None => return Err(Error::Config(format!("key not found: {key}"))),
                    },
                }
            }
        }

        Commands::Remote { action } => {
            let repo = open_repo(&cli.repo)?;
            let mut config = repo.load_config()?;
            match action {
                None => {
                    for remote in config.remotes() {
                        println!("{}\t{}", remote.name, remote.url);
                    }
                }
                Some(RemoteAction::Add { name, url }) => {
                    config.add_remote(&name, &url)?;
                    repo.save_config(&config)?;
                }
                Some(RemoteAction::Remove { name }) => {
                    config.remove_remote(&name)?;
                    repo.save_config(&config)?;
                }
            }
        }

        Commands::Fetch { remote, refspecs } => {
            let repo = open_repo(&cli.repo)?;
            let result = transport::fetch(&repo, &remote, &refspecs)?;
            for update in &result.updates {
                let old = update
                    .old
                    .map(|id| id.short())
                    .unwrap_or_else(|| "new".to_string());
                println!("  {old} -> {} {}", update.new.short(), update.refname);
            }
        }

        Commands::Push {
            remote,
            src,
            dst,
            force,
        } => {
            let repo = open_repo(&cli.repo)?;
            let src = src.unwrap_or_else(|| "HEAD".to_string());
            let dst = match dst {
                Some(dst) => dst,
                None => {
                    let branch = refs::current_branch(&repo)?.ok_or_else(|| {
                        Error::MalformedRef("push from detached HEAD needs a destination".into())
                    })?;
                    format!("refs/heads/{branch}")
                }
            };
            let result = transport::push(&repo, &remote, &src, &dst, force)?;
            let old = result
                .old
                .map(|id| id.short())
                .unwrap_or_else(|| "new".to_string());
            println!("{old} -> {} {}", result.new.short(), result.refname);
        }

        Commands::Clone { source, dest } => {
            transport::clone(&source, &dest)?;
            println!("Cloned {source} into {}", dest.display());
        }

        Commands::Gc { prune } => {
            let repo = open_repo(&cli.repo)?;
            let stats = ops::gc(&repo, prune)?;
            match stats.pack_sha {
                Some(sha) => println!(
                    "Packed {} objects into pack-{} ({} loose pruned)",
                    stats.packed,
                    sha.short(),
                    stats.pruned
                ),
                None => println!("Nothing to pack"),
            }
        }

        Commands::CatFile {
            kind,
            pretty,
            object,
        } => {
            let repo = open_repo(&cli.repo)?;
            let id = revision::rev_parse(&repo, &object)?;
            let loaded = repo.odb().load(&id)?;
            if kind {
                println!("{}", loaded.kind());
            } else if pretty {
                cat_file_pretty(&loaded)?;
            } else {
                std::io::stdout()
                    .write_all(loaded.content())
                    .map_err(|source| Error::Io {
                        path: PathBuf::from("<stdout>"),
                        source,
                    })?;
            }
        }

        Commands::HashObject { path, write } => {
            let repo = open_repo(&cli.repo)?;
            let full = repo.safe_path(&path)?;
            let content = std::fs::read(&full).map_err(|source| Error::Io {
                path: full.clone(),
                source,
            })?;
            let id = if write {
                repo.odb()
                    .store(&Object::Blob(object::Blob::new(content)))?
            } else {
                mingit::object_digest("blob", &content)
            };
            println!("{id}");
        }

        Commands::LsTree {
            tree_ish,
            recursive,
            name_only,
        } => {
            let repo = open_repo(&cli.repo)?;
            let id = revision::rev_parse_peeled(&repo, &tree_ish)?;
            let tree_id = match repo.odb().load(&id)? {
                Object::Commit(commit) => commit.tree,
                Object::Tree(_) => id,
                other => {
                    return Err(Error::InvalidRevision(format!(
                        "{tree_ish} is a {}, not a tree-ish",
                        other.kind()
                    )))
                }
            };
            ls_tree(&repo, &tree_id, "", recursive, name_only)?;
        }

        Commands::WriteTree => {
            let repo = open_repo(&cli.repo)?;
            let index = mingit::Index::load(&repo)?;
            let id = mingit::worktree::tree_from_index(&repo, &index)?;
            println!("{id}");
        }

        Commands::CommitTree {
            tree,
            parents,
            message,
        } => {
            let repo = open_repo(&cli.repo)?;
            let tree_id = revision::rev_parse(&repo, &tree)?;
            let parent_ids = parents
                .iter()
                .map(|p| revision::rev_parse_commit(&repo, p))
                .collect::<mingit::Result<Vec<_>>>()?;
            let author = ops::identity::author_ident(&repo)?;
            let committer = ops::identity::committer_ident(&repo)?;
            let commit = mingit::Commit::new(tree_id, parent_ids, author, committer, message);
            let id = repo.odb().store(&Object::Commit(commit))?;
            println!("{id}");
        }

        Commands::RevParse { rev, short } => {
            let repo = open_repo(&cli.repo)?;
            let id = revision::rev_parse(&repo, &rev)?;
            if short {
                println!("{}", id.short());
            } else {
                println!("{id}");
            }
        }

        Commands::MergeBase { a, b } => {
            let repo = open_repo(&cli.repo)?;
            let a = revision::rev_parse_commit(&repo, &a)?;
            let b = revision::rev_parse_commit(&repo, &b)?;
            match graph::merge_base(&repo, &a, &b)? {
                Some(base) => println!("{base}"),
                None => return Err(Error::InvalidRevision("no common ancestor".into())),
            }
        }

        Commands::ShowRef { heads, tags } => {
            let repo = open_repo(&cli.repo)?;
            let mut prefixes = Vec::new();
            if heads || !tags {
                prefixes.push(refs::HEADS_PREFIX);
            }
            if tags || !heads {
                prefixes.push(refs::TAGS_PREFIX);
            }
            for prefix in prefixes {
                for refname in refs::list_with_prefix(&repo, prefix)? {
                    if let Some(id) = refs::resolve(&repo, &refname)? {
                        println!("{id} {refname}");
                    }
                }
            }
        }

        Commands::SymbolicRef { name, refname } => {
            let repo = open_repo(&cli.repo)?;
            if name != "HEAD" {
                return Err(Error::MalformedRef(
                    "symbolic-ref supports HEAD only".into(),
                ));
            }
            if !refname.starts_with(refs::HEADS_PREFIX) {
                return Err(Error::MalformedRef(format!(
                    "refname must be under refs/heads/: {refname}"
                )));
            }
            refs::update_head(
                &repo,
                &refs::HeadState::Symbolic(refname.clone()),
                &format!("symbolic-ref: {refname}"),
            )?;
        }

        Commands::UpdateRef { refname, new, old } => {
            let repo = open_repo(&cli.repo)?;
            let new_id = revision::rev_parse(&repo, &new)?;
            let old_id = old
                .map(|old| revision::rev_parse(&repo, &old))
                .transpose()?;
            refs::update_ref(
                &repo,
                &refname,
                &new_id,
                old_id.as_ref(),
                &format!("update-ref: {refname}"),
            )?;
        }

        Commands::Verify { rev } => {
            let repo = open_repo(&cli.repo)?;
            let id = revision::rev_parse(&repo, &rev)?;
            let loaded = repo.odb().load(&id)?;
            match object::verify_signature(&loaded) {
                (true, _) => println!("{id}: no signature"),
                (false, reason) => println!("{id}: unverified ({reason})"),
            }
        }
    }
    Ok(())
}

fn report_rebase(outcome: ops::RebaseOutcome) {
    match outcome {
        ops::RebaseOutcome::AlreadyUpToDate => println!("Already up to date."),
        ops::RebaseOutcome::Finished { new_head, replayed } => {
            println!("Rebase complete: {replayed} commit(s) onto {}", new_head.short())
        }
    }
}

fn cat_file_pretty(loaded: &Object) -> mingit::Result<()> {
    match loaded {
        Object::Commit(commit) => {
            println!("tree {}", commit.tree);
            for parent in &commit.parents {
                println!("parent {parent}");
            }
            println!("author {}", commit.author);
            println!("committer {}", commit.committer);
            println!();
            print!("{}", commit.message);
        }
        Object::Tree(tree) => {
            for entry in tree.entries() {
                let kind = if entry.mode.is_dir() { "tree" } else { "blob" };
                println!("{} {kind} {}\t{}", entry.mode.display_str(), entry.id, entry.name);
            }
        }
        Object::Tag(tag) => {
            println!("object {}", tag.object);
            println!("type {}", tag.target_kind);
            println!("tag {}", tag.name);
            if let Some(tagger) = &tag.tagger {
                println!("tagger {tagger}");
            }
            println!();
            print!("{}", tag.message);
        }
        Object::Blob(blob) => {
            std::io::stdout()
                .write_all(&blob.content)
                .map_err(|source| Error::Io {
                    path: PathBuf::from("<stdout>"),
                    source,
                })?;
        }
    }
    Ok(())
}

fn ls_tree(
    repo: &Repository,
    tree_id: &mingit::ObjectId,
    prefix: &str,
    recursive: bool,
    name_only: bool,
) -> mingit::Result<()> {
    let loaded = repo.odb().load(tree_id)?;
    let tree = loaded.as_tree()?;
    for entry in tree.entries() {
        let path = format!("{prefix}{}", entry.name);
        if name_only {
            println!("{path}");
        } else {
            let kind = if entry.mode.is_dir() { "tree" } else { "blob" };
            println!("{} {kind}\t{}\t{path}", entry.mode.display_str(), entry.id);
        }
        if recursive && entry.mode.is_dir() {
            ls_tree(repo, &entry.id, &format!("{path}/"), recursive, name_only)?;
        }
    }
    Ok(())
}
