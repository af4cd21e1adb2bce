//! mingit - a byte-compatible Git core
//!
//! the object store, staging index, reference graph, pack/delta codec and
//! synchronization protocol of Git, interoperable bit-for-bit with a
//! standard installation sharing the same on-disk repository layout.
//!
//! # Core concepts
//!
//! - **Object**: blob, tree, commit or tag, addressed by the SHA-1 of
//!   `"<kind> <size>\0" + content` and stored zlib-deflated, loose or
//!   inside a packfile with an idx v2 sidecar
//! - **Index**: the binary DIRC v2 staging area mapping path to
//!   (id, mode, stat), with merge stages 1/2/3 on conflicts
//! - **Refs**: loose files under `refs/` with a packed-refs fallback,
//!   updated atomically under `<ref>.lock`, every move reflogged
//! - **Transports**: local, dumb HTTP and pkt-line smart (upload-pack),
//!   behind one capability trait
//!
//! # Example usage
//!
//! ```no_run
//! use std::path::Path;
//! use mingit::{ops, Repository};
//!
//! let repo = Repository::init(Path::new("/path/to/project")).unwrap();
//! ops::add_path(&repo, "src/main.rs", false).unwrap();
//! ops::commit(&repo, Some("initial import")).unwrap();
//! ```

mod config;
mod error;
mod hash;
mod repo;

pub mod graph;
pub mod ignore;
pub mod index;
pub mod merge;
pub mod object;
pub mod odb;
pub mod ops;
pub mod reflog;
pub mod refs;
pub mod revision;
pub mod transport;
pub mod worktree;

pub use config::{Config, Remote};
pub use error::{Error, IoResultExt, Result};
pub use hash::{object_digest, sha1_digest, ObjectId, MIN_PREFIX_LEN};
pub use index::{Index, IndexEntry};
pub use object::{Blob, Commit, FileMode, Ident, Kind, Object, Tag, Tree, TreeEntry};
pub use repo::{Repository, DEFAULT_BRANCH};
pub use revision::{rev_parse, rev_parse_commit, rev_parse_peeled};
