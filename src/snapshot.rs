use std::sync::Arc;

use git2::Oid;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::paths;
use crate::store::StoreInner;
use crate::tree;
use crate::types::{
    Branch, CommitId, CommitRecord, FileChange, Grant, Repository, RepositoryId,
    Sequences, UserId,
};

/// Typed read access to the ledger tables.
///
/// Implemented by [`Snapshot`] (a committed state) and by
/// [`Transaction`](crate::Transaction) (a snapshot plus its own staged
/// writes). Every component reads through this trait so the same code runs
/// inside and outside a transaction.
pub trait Reader {
    /// Raw bytes stored at `key`, or `None` if missing.
    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sorted entry names directly under `dir`.
    fn list_raw(&self, dir: &str) -> Result<Vec<String>>;

    /// Decode the JSON row at `key`.
    ///
    /// # Errors
    /// Returns [`Error::Integrity`] if the stored row is malformed.
    fn read_row<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_raw(key)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Error::integrity(format!("malformed row {}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Decode every row directly under `dir`, in id order.
    fn read_rows<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for name in self.list_raw(dir)? {
            if paths::row_id(&name).is_none() {
                continue;
            }
            let key = format!("{}/{}", dir, name);
            if let Some(row) = self.read_row(&key)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    fn sequences(&self) -> Result<Sequences> {
        Ok(self.read_row(paths::SEQUENCES_KEY)?.unwrap_or_default())
    }

    fn repository(&self, id: RepositoryId) -> Result<Option<Repository>> {
        self.read_row(&paths::repository_key(id))
    }

    fn repositories(&self) -> Result<Vec<Repository>> {
        self.read_rows(paths::REPOSITORIES_DIR)
    }

    fn grant(&self, repo: RepositoryId, user: UserId) -> Result<Option<Grant>> {
        self.read_row(&paths::grant_key(repo, user))
    }

    fn grants(&self, repo: RepositoryId) -> Result<Vec<Grant>> {
        self.read_rows(&paths::grants_dir(repo))
    }

    fn branches(&self, repo: RepositoryId) -> Result<Vec<Branch>> {
        self.read_rows(&paths::branches_dir(repo))
    }

    fn commit_record(&self, id: CommitId) -> Result<Option<CommitRecord>> {
        self.read_row(&paths::commit_key(id))
    }

    /// The commit carrying `hash`, if any.
    fn commit_by_hash(&self, hash: &str) -> Result<Option<CommitRecord>> {
        let id: Option<CommitId> = self.read_row(&paths::commit_hash_key(hash))?;
        match id {
            Some(id) => self.commit_record(id),
            None => Ok(None),
        }
    }

    /// All commits of `repo`, oldest first.
    fn commits(&self, repo: RepositoryId) -> Result<Vec<CommitRecord>> {
        let all: Vec<CommitRecord> = self.read_rows(paths::COMMITS_DIR)?;
        Ok(all.into_iter().filter(|c| c.repository == repo).collect())
    }

    /// The stored diff chain of one path, oldest row first.
    fn chain(&self, repo: RepositoryId, path: &str) -> Result<Vec<FileChange>> {
        let rows: Vec<FileChange> = self.read_rows(&paths::chain_dir(repo, path))?;
        for row in &rows {
            if row.path != path || row.repository != repo {
                return Err(Error::integrity(format!(
                    "change {} filed under '{}' belongs to '{}'",
                    row.id, path, row.path
                )));
            }
        }
        Ok(rows)
    }

    /// The newest row of one path's chain.
    fn latest_change(&self, repo: RepositoryId, path: &str) -> Result<Option<FileChange>> {
        let dir = paths::chain_dir(repo, path);
        let names = self.list_raw(&dir)?;
        let newest = names.iter().rev().find(|n| paths::row_id(n).is_some());
        match newest {
            Some(name) => self.read_row(&format!("{}/{}", dir, name)),
            None => Ok(None),
        }
    }

    /// Every path that has a chain in `repo`, sorted.
    fn chain_paths(&self, repo: RepositoryId) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for name in self.list_raw(&paths::changes_root(repo))? {
            let path = paths::chain_path(&name).ok_or_else(|| {
                Error::integrity(format!("undecodable chain directory '{}'", name))
            })?;
            out.push(path);
        }
        out.sort();
        Ok(out)
    }
}

/// An immutable view of the ledger at one committed state.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Snapshot {
    pub(crate) inner: Arc<StoreInner>,
    pub(crate) commit_oid: Oid,
    pub(crate) tree_oid: Oid,
}

impl Snapshot {
    /// Run `f` with the locked repository.
    pub(crate) fn with_repo<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&git2::Repository) -> Result<T>,
    {
        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        f(&repo)
    }

    /// Hex id of the ledger commit this snapshot is pinned to.
    pub fn ledger_hash(&self) -> String {
        self.commit_oid.to_string()
    }
}

impl Reader for Snapshot {
    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_repo(|repo| tree::read_blob(repo, self.tree_oid, key))
    }

    fn list_raw(&self, dir: &str) -> Result<Vec<String>> {
        let mut names = self.with_repo(|repo| tree::list_dir(repo, self.tree_oid, dir))?;
        names.sort();
        Ok(names)
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Snapshot({})", self.commit_oid)
    }
}
