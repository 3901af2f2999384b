mod common;

use common::{ALICE, BOB};
use uvcs::access::level_of;
use uvcs::*;

const CAROL: UserId = UserId(3);

// ---------------------------------------------------------------------------
// Repository registry
// ---------------------------------------------------------------------------

#[test]
fn names_are_unique_per_owner() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _repo) = common::store_with_repo(dir.path());

    let err = store.repositories().create(ALICE, "demo", "").unwrap_err();
    assert!(matches!(err, Error::KeyExists(_)));

    // Another owner may reuse the name.
    store.repositories().create(BOB, "demo", "").unwrap();
}

#[test]
fn invalid_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::create_store(dir.path());
    for name in ["", "   ", "a/b"] {
        let err = store.repositories().create(ALICE, name, "").unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{:?}", name);
    }
}

#[test]
fn deactivated_name_can_be_reused() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    store.repositories().deactivate(repo.id).unwrap();

    assert!(!store.repositories().get(repo.id).unwrap().active);
    assert!(matches!(
        store.repositories().find(ALICE, "demo"),
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        store.repositories().deactivate(repo.id),
        Err(Error::NotFound(_))
    ));

    let again = store.repositories().create(ALICE, "demo", "").unwrap();
    assert_ne!(again.id, repo.id);
}

#[test]
fn for_user_lists_owned_and_granted() {
    let dir = tempfile::tempdir().unwrap();
    let (store, demo) = common::store_with_repo(dir.path());
    let bobs = store.repositories().create(BOB, "tools", "").unwrap();
    store.grants(demo.id).grant(BOB, AccessLevel::Read).unwrap();

    let listed: Vec<_> = store
        .repositories()
        .for_user(BOB)
        .unwrap()
        .into_iter()
        .map(|(r, level)| (r.id, level))
        .collect();
    assert_eq!(
        listed,
        vec![(bobs.id, AccessLevel::Owner), (demo.id, AccessLevel::Read)]
    );
    assert!(store.repositories().for_user(CAROL).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Grants
// ---------------------------------------------------------------------------

#[test]
fn grant_upserts_and_revoke_removes() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    let grants = store.grants(repo.id);

    grants.grant(BOB, AccessLevel::Read).unwrap();
    grants.grant(BOB, AccessLevel::Write).unwrap();
    grants.grant(CAROL, AccessLevel::Read).unwrap();

    let listed: Vec<_> = grants.list().unwrap().into_iter().map(|g| (g.user, g.level)).collect();
    assert_eq!(
        listed,
        vec![(BOB, AccessLevel::Write), (CAROL, AccessLevel::Read)]
    );

    grants.revoke(BOB).unwrap();
    assert!(matches!(grants.revoke(BOB), Err(Error::NotFound(_))));
    assert_eq!(grants.list().unwrap().len(), 1);
}

#[test]
fn ownership_cannot_be_granted() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    assert!(matches!(
        store.grants(repo.id).grant(BOB, AccessLevel::Owner),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        store.grants(repo.id).grant(ALICE, AccessLevel::Write),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        store.grants(RepositoryId(42)).grant(BOB, AccessLevel::Read),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn stored_access_answers_from_grants() {
    let dir = tempfile::tempdir().unwrap();
    let (store, repo) = common::store_with_repo(dir.path());
    let access = StoredAccess::new(store.clone());

    assert_eq!(access.access_level(&repo, ALICE).unwrap(), Some(AccessLevel::Owner));
    assert!(access.can_write(&repo, ALICE).unwrap());
    assert_eq!(access.access_level(&repo, BOB).unwrap(), None);
    assert!(!access.can_write(&repo, BOB).unwrap());

    store.grants(repo.id).grant(BOB, AccessLevel::Read).unwrap();
    assert!(!access.can_write(&repo, BOB).unwrap());
    store.grants(repo.id).grant(BOB, AccessLevel::Write).unwrap();
    assert!(access.can_write(&repo, BOB).unwrap());

    let snap = store.snapshot().unwrap();
    assert_eq!(level_of(&snap, &repo, BOB).unwrap(), Some(AccessLevel::Write));
}

#[test]
fn access_levels_parse_and_order() {
    assert_eq!("write".parse::<AccessLevel>().unwrap(), AccessLevel::Write);
    assert!("admin".parse::<AccessLevel>().is_err());
    assert!(AccessLevel::Owner > AccessLevel::Write);
    assert!(AccessLevel::Write > AccessLevel::Read);
    assert!(!AccessLevel::Read.can_write());
}
