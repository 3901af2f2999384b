mod common;

use uvcs::*;

// ---------------------------------------------------------------------------
// Open / create
// ---------------------------------------------------------------------------

#[test]
fn create_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());
    store.repositories().create(common::ALICE, "demo", "").unwrap();
    drop(store);

    let store = Store::open(dir.path().join("test.git"), OpenOptions::default()).unwrap();
    let repo = store.repositories().find(common::ALICE, "demo").unwrap();
    assert_eq!(repo.name, "demo");
}

#[test]
fn open_missing_errors() {
    let dir = tempfile::tempdir().unwrap();
    let result = Store::open(dir.path().join("nope.git"), OpenOptions::default());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn fresh_store_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());
    let snap = store.snapshot().unwrap();
    assert!(snap.repositories().unwrap().is_empty());
    assert_eq!(snap.sequences().unwrap(), Sequences::default());
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[test]
fn staged_writes_are_visible_inside_the_transaction_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());

    let mut txn = store.begin().unwrap();
    let id = txn.next_id(Table::Commit).unwrap();
    assert_eq!(id, 1);
    assert_eq!(txn.sequences().unwrap().commit, 1);
    assert_eq!(store.snapshot().unwrap().sequences().unwrap().commit, 0);

    txn.commit("allocate").unwrap();
    assert_eq!(store.snapshot().unwrap().sequences().unwrap().commit, 1);
}

#[test]
fn dropped_transaction_discards_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());
    let before = store.snapshot().unwrap().ledger_hash();

    {
        let mut txn = store.begin().unwrap();
        txn.next_id(Table::Repository).unwrap();
        assert!(!txn.is_empty());
    }

    let after = store.snapshot().unwrap();
    assert_eq!(after.ledger_hash(), before);
    assert_eq!(after.sequences().unwrap().repository, 0);
}

#[test]
fn empty_commit_publishes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());
    let before = store.snapshot().unwrap().ledger_hash();
    let snap = store.begin().unwrap().commit("nothing").unwrap();
    assert_eq!(snap.ledger_hash(), before);
}

#[test]
fn stale_transaction_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());

    let mut first = store.begin().unwrap();
    let mut second = store.begin().unwrap();
    first.next_id(Table::Branch).unwrap();
    second.next_id(Table::Branch).unwrap();

    first.commit("first").unwrap();
    let err = second.commit("second").unwrap_err();
    assert!(matches!(err, Error::StaleSnapshot(_)));
    assert!(err.is_retryable());

    // Only the first allocation landed.
    assert_eq!(store.snapshot().unwrap().sequences().unwrap().branch, 1);
}

#[test]
fn store_write_reruns_after_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());
    let mut attempts = 0;

    let id = store
        .write(|txn| {
            attempts += 1;
            if attempts == 1 {
                // Another writer publishes while this unit of work runs.
                let mut other = store.begin()?;
                other.next_id(Table::Commit)?;
                other.commit("interleaved")?;
            }
            let id = txn.next_id(Table::Commit)?;
            Ok((id, "allocate".to_string()))
        })
        .unwrap();

    assert_eq!(attempts, 2);
    assert_eq!(id, 2);
}

#[test]
fn retry_write_gives_up_after_budget() {
    let mut calls = 0;
    let result: Result<()> = retry_write(2, || {
        calls += 1;
        Err(Error::stale_snapshot("always"))
    });
    assert!(matches!(result, Err(Error::StaleSnapshot(_))));
    assert_eq!(calls, 3);
}

#[test]
fn retry_write_does_not_retry_other_errors() {
    let mut calls = 0;
    let result: Result<()> = retry_write(5, || {
        calls += 1;
        Err(Error::validation("bad"))
    });
    assert!(matches!(result, Err(Error::Validation(_))));
    assert_eq!(calls, 1);
}

#[test]
fn removed_rows_disappear_from_listings() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    store
        .grants(repo.id)
        .grant(common::BOB, AccessLevel::Read)
        .unwrap();

    let mut txn = store.begin().unwrap();
    assert_eq!(txn.grants(repo.id).unwrap().len(), 1);
    let key = format!("grants/{}/{:020}.json", repo.id, common::BOB.0);
    txn.remove_row(&key).unwrap();
    assert!(txn.grants(repo.id).unwrap().is_empty());
    txn.commit("revoke").unwrap();

    assert!(store.snapshot().unwrap().grants(repo.id).unwrap().is_empty());
}
