use std::path::Path;

use uvcs::*;

pub const ALICE: UserId = UserId(1);
#[allow(dead_code)]
pub const BOB: UserId = UserId(2);

pub fn create_store(dir: &Path) -> Store {
    Store::open(dir.join("test.git"), OpenOptions {
        create: true,
        ..Default::default()
    })
    .unwrap()
}

/// A store with one repository `demo` owned by [`ALICE`].
#[allow(dead_code)]
pub fn store_with_repo(dir: &Path) -> (Store, Repository) {
    let store = create_store(dir);
    let repo = store.repositories().create(ALICE, "demo", "test repository").unwrap();
    (store, repo)
}

#[allow(dead_code)]
pub fn writer(store: &Store) -> CommitWriter<StoredAccess> {
    CommitWriter::new(store.clone(), StoredAccess::new(store.clone()))
}

/// Commit one file to `demo` as [`ALICE`].
#[allow(dead_code)]
pub fn commit_file(store: &Store, path: &str, data: &[u8]) -> CommitOutcome {
    let request = CommitRequest::new("demo", format!("update {}", path)).file(path, data);
    writer(store).commit(ALICE, &request).unwrap()
}

/// Error from a one-file commit to `demo` by `author`.
#[allow(dead_code)]
pub fn commit_request_err(store: &Store, author: UserId) -> Error {
    let request = CommitRequest::new("demo", "attempt").file("a.txt", "a");
    writer(store).commit(author, &request).unwrap_err()
}
