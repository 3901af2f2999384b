//! A minimal version-control backend.
//!
//! `uvcs` stores named repositories, their branches and an ordered commit
//! history. File contents are kept as per-path diff chains: the first
//! version of a text file is stored in full, later versions as patches
//! against their predecessor, and binaries always in full. Any version can
//! be reconstructed by walking the chain back to a full snapshot.
//!
//! All state lives in a bare git repository used as a transactional row
//! store. Each write is one atomic ledger commit, and concurrent writers
//! that race on the same state are detected and rerun.
//!
//! # Key types
//!
//! - [`Store`] opens (or creates) the backing repository and hands out
//!   [`Snapshot`]s and [`Transaction`]s.
//! - [`CommitWriter`] turns a [`CommitRequest`] into one commit.
//! - [`Branches`], [`Repositories`] and [`Grants`] manage the graph and
//!   registry.
//! - [`history::resolve`] and [`materialize::snapshot`] read content back.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use uvcs::{CommitRequest, CommitWriter, OpenOptions, Store, StoredAccess, UserId};
//!
//! let store = Store::open("/tmp/uvcs.git", OpenOptions { create: true, ..Default::default() }).unwrap();
//! let alice = UserId(1);
//! let repo = store.repositories().create(alice, "demo", "").unwrap();
//!
//! let writer = CommitWriter::new(store.clone(), StoredAccess::new(store.clone()));
//! let request = CommitRequest::new("demo", "first").file("main.go", "package main\n");
//! writer.commit(alice, &request).unwrap();
//!
//! let file = uvcs::history::resolve(&store.snapshot().unwrap(), repo.id, "main.go").unwrap();
//! assert_eq!(file.text().unwrap(), "package main");
//! ```

pub mod access;
pub mod branch;
pub mod classify;
pub mod commit;
pub mod diff;
pub mod error;
pub mod history;
pub mod lock;
pub mod materialize;
pub mod paths;
pub mod repository;
pub mod snapshot;
pub mod store;
pub mod transaction;
mod tree;
pub mod types;

// Re-export primary public types at crate root.
pub use access::{AccessControl, Grants, StoredAccess};
pub use branch::Branches;
pub use commit::{parse_tags, CommitOutcome, CommitRequest, CommitWriter, IncomingFile, ProcessedFile};
pub use diff::{apply_patch, compute_diff, Patch};
pub use error::{Error, Result};
pub use history::{LoggedCommit, ResolvedFile};
pub use materialize::MaterializedFile;
pub use repository::Repositories;
pub use snapshot::{Reader, Snapshot};
pub use store::{retry_write, Store};
pub use transaction::{Table, Transaction};
pub use types::*;
