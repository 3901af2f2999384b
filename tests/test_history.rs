mod common;

use uvcs::history::{self, resolve, resolve_at, versions};
use uvcs::*;

fn change_key(repo: RepositoryId, path: &str, id: ChangeId) -> String {
    format!("changes/{}/{}/{:020}.json", repo, hex::encode(path), id.0)
}

/// Overwrite a stored row, bypassing the commit path.
fn tamper(store: &Store, row: &FileChange) {
    let mut txn = store.begin().unwrap();
    txn.put_row(&change_key(row.repository, &row.path, row.id), row)
        .unwrap();
    txn.commit("tamper").unwrap();
}

// ---------------------------------------------------------------------------
// Chain integrity
// ---------------------------------------------------------------------------

#[test]
fn n_commits_resolve_to_the_last_content() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());

    let contents: Vec<String> = (0..8)
        .map(|i| {
            (0..=i)
                .map(|j| format!("line {} of version {}", j, i))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect();
    for content in &contents {
        common::commit_file(&store, "notes.txt", content.as_bytes());
    }

    let snap = store.snapshot().unwrap();
    let file = resolve(&snap, repo.id, "notes.txt").unwrap();
    assert_eq!(file.text().unwrap(), contents.last().unwrap());

    let rows = versions(&snap, repo.id, "notes.txt").unwrap();
    assert_eq!(rows.len(), contents.len());
    let full: Vec<_> = rows.iter().filter(|r| !r.content_change.is_diff).collect();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].id, rows[0].id);
    assert_eq!(rows[0].change_kind, ChangeKind::Added);
    assert!(rows[1..].iter().all(|r| r.change_kind == ChangeKind::Modified));
}

#[test]
fn every_row_links_to_its_predecessor() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    for content in ["a", "a\nb", "a\nb\nc"] {
        common::commit_file(&store, "f.txt", content.as_bytes());
    }

    let rows = versions(&store.snapshot().unwrap(), repo.id, "f.txt").unwrap();
    assert_eq!(rows[0].previous, None);
    assert_eq!(rows[1].previous, Some(rows[0].id));
    assert_eq!(rows[2].previous, Some(rows[1].id));
}

#[test]
fn resolve_at_returns_each_historical_version() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    let first = common::commit_file(&store, "f.txt", b"one\n");
    let other = common::commit_file(&store, "g.txt", b"unrelated\n");
    let second = common::commit_file(&store, "f.txt", b"one\ntwo\n");

    let snap = store.snapshot().unwrap();
    let at = |c: CommitId| resolve_at(&snap, repo.id, "f.txt", c).unwrap();
    assert_eq!(at(first.id()).text().unwrap(), "one\n");
    assert_eq!(at(other.id()).text().unwrap(), "one\n");
    assert_eq!(at(other.id()).commit, first.id());
    assert_eq!(at(second.id()).text().unwrap(), "one\ntwo\n");

    // g.txt did not exist yet at the first commit.
    let err = resolve_at(&snap, repo.id, "g.txt", first.id()).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn unknown_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    let err = resolve(&store.snapshot().unwrap(), repo.id, "nope.txt").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn resolve_normalizes_the_requested_path() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    common::commit_file(&store, "docs/readme.txt", b"hi");
    let file = resolve(&store.snapshot().unwrap(), repo.id, "/docs//readme.txt").unwrap();
    assert_eq!(file.path, "docs/readme.txt");
    assert_eq!(file.content, b"hi");
}

// ---------------------------------------------------------------------------
// Broken chains
// ---------------------------------------------------------------------------

#[test]
fn missing_predecessor_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    common::commit_file(&store, "f.txt", b"a\n");
    common::commit_file(&store, "f.txt", b"a\nb\n");

    let snap = store.snapshot().unwrap();
    let mut latest = snap.latest_change(repo.id, "f.txt").unwrap().unwrap();
    assert!(latest.content_change.is_diff);
    latest.previous = Some(ChangeId(0));
    tamper(&store, &latest);

    let err = resolve(&store.snapshot().unwrap(), repo.id, "f.txt").unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[test]
fn diff_without_predecessor_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    common::commit_file(&store, "f.txt", b"a\n");
    common::commit_file(&store, "f.txt", b"b\n");

    let mut latest = store
        .snapshot()
        .unwrap()
        .latest_change(repo.id, "f.txt")
        .unwrap()
        .unwrap();
    latest.previous = None;
    tamper(&store, &latest);

    let err = resolve(&store.snapshot().unwrap(), repo.id, "f.txt").unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[test]
fn self_reference_is_rejected_not_looped() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    common::commit_file(&store, "f.txt", b"a\n");
    common::commit_file(&store, "f.txt", b"b\n");

    let mut latest = store
        .snapshot()
        .unwrap()
        .latest_change(repo.id, "f.txt")
        .unwrap()
        .unwrap();
    latest.previous = Some(latest.id);
    tamper(&store, &latest);

    let err = resolve(&store.snapshot().unwrap(), repo.id, "f.txt").unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[test]
fn patch_that_does_not_apply_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    common::commit_file(&store, "f.txt", b"a\n");
    common::commit_file(&store, "f.txt", b"a\nb\n");

    let mut latest = store
        .snapshot()
        .unwrap()
        .latest_change(repo.id, "f.txt")
        .unwrap()
        .unwrap();
    latest.content_change.content = "=100\n".into();
    tamper(&store, &latest);

    let err = resolve(&store.snapshot().unwrap(), repo.id, "f.txt").unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

#[test]
fn malformed_row_is_an_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    let outcome = common::commit_file(&store, "f.txt", b"a\n");
    let row = store
        .snapshot()
        .unwrap()
        .latest_change(repo.id, "f.txt")
        .unwrap()
        .unwrap();
    assert_eq!(row.commit, outcome.id());

    let mut txn = store.begin().unwrap();
    txn.put_row(&change_key(repo.id, "f.txt", row.id), &"not a row")
        .unwrap();
    txn.commit("corrupt").unwrap();

    let err = resolve(&store.snapshot().unwrap(), repo.id, "f.txt").unwrap_err();
    assert!(matches!(err, Error::Integrity(_)));
}

// ---------------------------------------------------------------------------
// Commit log
// ---------------------------------------------------------------------------

#[test]
fn commit_log_is_newest_first_with_changes() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    let first = common::commit_file(&store, "a.txt", b"a");
    let request = CommitRequest::new("demo", "two files")
        .tags("release, v2")
        .file("b.txt", "b")
        .file("a.txt", "aa");
    let second = common::writer(&store).commit(common::ALICE, &request).unwrap();

    let log = history::commit_log(&store.snapshot().unwrap(), repo.id).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].commit.id, second.id());
    assert_eq!(log[0].commit.tags, vec!["release", "v2"]);
    let paths: Vec<_> = log[0].changes.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt"]);
    assert_eq!(log[1].commit.id, first.id());
    assert_eq!(log[1].changes.len(), 1);
}
