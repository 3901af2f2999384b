use chrono::Utc;
use log::info;

use crate::error::{Error, Result};
use crate::paths;
use crate::snapshot::Reader;
use crate::store::Store;
use crate::types::{AccessLevel, Grant, Repository, RepositoryId, UserId};

/// Answers "what access does this user hold on this repository".
///
/// The commit path only needs this one question; who keeps the grants is up
/// to the implementation.
pub trait AccessControl {
    /// `None` means no access at all.
    fn access_level(&self, repo: &Repository, user: UserId) -> Result<Option<AccessLevel>>;

    /// Owner and explicit write grants both allow writing; anything else is
    /// a rejection.
    fn can_write(&self, repo: &Repository, user: UserId) -> Result<bool> {
        Ok(self
            .access_level(repo, user)?
            .map(AccessLevel::can_write)
            .unwrap_or(false))
    }
}

impl<F> AccessControl for F
where
    F: Fn(&Repository, UserId) -> Option<AccessLevel>,
{
    fn access_level(&self, repo: &Repository, user: UserId) -> Result<Option<AccessLevel>> {
        Ok(self(repo, user))
    }
}

/// [`AccessControl`] backed by the grant rows kept in the store.
#[derive(Debug, Clone)]
pub struct StoredAccess {
    store: Store,
}

impl StoredAccess {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl AccessControl for StoredAccess {
    fn access_level(&self, repo: &Repository, user: UserId) -> Result<Option<AccessLevel>> {
        level_of(&self.store.snapshot()?, repo, user)
    }
}

/// Resolve `user`'s access on `repo` from stored rows.
pub fn level_of<R: Reader>(
    reader: &R,
    repo: &Repository,
    user: UserId,
) -> Result<Option<AccessLevel>> {
    if repo.owner == user {
        return Ok(Some(AccessLevel::Owner));
    }
    Ok(reader.grant(repo.id, user)?.map(|g| g.level))
}

/// A transient view over the explicit grants of one repository.
pub struct Grants<'a> {
    store: &'a Store,
    repo: RepositoryId,
}

impl<'a> Grants<'a> {
    pub(crate) fn new(store: &'a Store, repo: RepositoryId) -> Self {
        Self { store, repo }
    }

    /// Grant `level` to `user`, replacing any previous grant.
    ///
    /// # Errors
    /// * [`Error::NotFound`] if the repository does not exist.
    /// * [`Error::Validation`] for an `Owner` grant or a grant to the owner.
    pub fn grant(&self, user: UserId, level: AccessLevel) -> Result<Grant> {
        if level == AccessLevel::Owner {
            return Err(Error::validation("ownership cannot be granted"));
        }
        let repo_id = self.repo;
        let grant = self.store.write(|txn| {
            let repo = txn
                .repository(repo_id)?
                .ok_or_else(|| Error::not_found(format!("repository {}", repo_id)))?;
            if repo.owner == user {
                return Err(Error::validation(format!(
                    "user {} already owns repository '{}'",
                    user, repo.name
                )));
            }
            let grant = Grant {
                repository: repo_id,
                user,
                level,
                granted_at: Utc::now(),
            };
            txn.put_row(&paths::grant_key(repo_id, user), &grant)?;
            let msg = format!("grant {} on repository {} to user {}", level, repo_id, user);
            Ok((grant, msg))
        })?;
        info!("granted {} on repository {} to user {}", level, repo_id, user);
        Ok(grant)
    }

    /// Remove `user`'s explicit grant.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the user holds no grant.
    pub fn revoke(&self, user: UserId) -> Result<()> {
        let repo_id = self.repo;
        self.store.write(|txn| {
            let key = paths::grant_key(repo_id, user);
            if txn.read_raw(&key)?.is_none() {
                return Err(Error::not_found(format!(
                    "no access for user {} on repository {}",
                    user, repo_id
                )));
            }
            txn.remove_row(&key)?;
            Ok(((), format!("revoke access on repository {} from user {}", repo_id, user)))
        })?;
        info!("revoked access on repository {} from user {}", repo_id, user);
        Ok(())
    }

    /// All explicit grants, strongest first, then by user.
    pub fn list(&self) -> Result<Vec<Grant>> {
        let mut grants = self.store.snapshot()?.grants(self.repo)?;
        grants.sort_by(|a, b| b.level.cmp(&a.level).then(a.user.cmp(&b.user)));
        Ok(grants)
    }
}
