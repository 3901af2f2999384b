use chrono::Utc;
use log::info;

use crate::access::level_of;
use crate::error::{Error, Result};
use crate::paths;
use crate::snapshot::Reader;
use crate::store::Store;
use crate::transaction::Table;
use crate::types::{AccessLevel, Repository, RepositoryId, UserId};

/// A transient view over the repository registry.
pub struct Repositories<'a> {
    store: &'a Store,
}

impl<'a> Repositories<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Register a new active repository owned by `owner`.
    ///
    /// # Errors
    /// * [`Error::Validation`] if `name` is empty or contains a slash.
    /// * [`Error::KeyExists`] if `owner` already has an active repository
    ///   with that name.
    pub fn create(&self, owner: UserId, name: &str, description: &str) -> Result<Repository> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("repository name is required"));
        }
        if name.contains('/') {
            return Err(Error::validation(format!(
                "repository name '{}' must not contain '/'",
                name
            )));
        }

        let repo = self.store.write(|txn| {
            if find_active(&*txn, owner, name)?.is_some() {
                return Err(Error::key_exists(format!(
                    "repository '{}' already exists for user {}",
                    name, owner
                )));
            }
            let id = RepositoryId(txn.next_id(Table::Repository)?);
            let repo = Repository {
                id,
                owner,
                name: name.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
                active: true,
            };
            txn.put_row(&paths::repository_key(id), &repo)?;
            let msg = format!("create repository {} '{}'", id, name);
            Ok((repo, msg))
        })?;

        info!("created repository '{}' ({}) for user {}", repo.name, repo.id, owner);
        Ok(repo)
    }

    pub fn get(&self, id: RepositoryId) -> Result<Repository> {
        self.store
            .snapshot()?
            .repository(id)?
            .ok_or_else(|| Error::not_found(format!("repository {}", id)))
    }

    /// The active repository `name` owned by `owner`.
    pub fn find(&self, owner: UserId, name: &str) -> Result<Repository> {
        find_active(&self.store.snapshot()?, owner, name)?
            .ok_or_else(|| Error::not_found(format!("repository '{}'", name)))
    }

    /// Mark a repository inactive. Its history is kept.
    pub fn deactivate(&self, id: RepositoryId) -> Result<()> {
        self.store.write(|txn| {
            let mut repo = txn
                .repository(id)?
                .ok_or_else(|| Error::not_found(format!("repository {}", id)))?;
            if !repo.active {
                return Err(Error::not_found(format!(
                    "repository '{}' is already inactive",
                    repo.name
                )));
            }
            repo.active = false;
            txn.put_row(&paths::repository_key(id), &repo)?;
            Ok(((), format!("deactivate repository {}", id)))
        })?;
        info!("deactivated repository {}", id);
        Ok(())
    }

    /// Active repositories `user` owns or holds a grant on, newest first.
    pub fn for_user(&self, user: UserId) -> Result<Vec<(Repository, AccessLevel)>> {
        let snap = self.store.snapshot()?;
        let mut out = Vec::new();
        for repo in snap.repositories()? {
            if !repo.active {
                continue;
            }
            if let Some(level) = level_of(&snap, &repo, user)? {
                out.push((repo, level));
            }
        }
        out.sort_by(|(a, _), (b, _)| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }
}

/// The active repository `name` owned by `owner`, if any.
pub(crate) fn find_active<R: Reader>(
    reader: &R,
    owner: UserId,
    name: &str,
) -> Result<Option<Repository>> {
    Ok(reader
        .repositories()?
        .into_iter()
        .find(|r| r.active && r.owner == owner && r.name == name))
}
