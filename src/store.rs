use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{info, warn};
use rand::Rng;

use crate::access::Grants;
use crate::branch::Branches;
use crate::error::{Error, Result};
use crate::repository::Repositories;
use crate::snapshot::Snapshot;
use crate::transaction::Transaction;
use crate::tree;
use crate::types::{OpenOptions, RepositoryId, Signature, DEFAULT_RETRIES};

/// The single ref whose commits are the published states of the database.
pub const LEDGER_REF: &str = "refs/uvcs/ledger";

/// Internal state shared via `Arc`.
pub(crate) struct StoreInner {
    pub(crate) repo: Mutex<git2::Repository>,
    pub(crate) path: PathBuf,
    pub(crate) signature: Signature,
    pub(crate) retries: u32,
}

/// The transactional store: repositories, branches, commits and diff chains
/// persisted in a bare git repository.
///
/// Cheap to clone (`Arc` internally). Pass it to each component explicitly.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

impl Store {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let sig = Signature {
            name: options.author.unwrap_or_else(|| "uvcs".into()),
            email: options.email.unwrap_or_else(|| "uvcs@localhost".into()),
        };

        let repo = if path.exists() {
            git2::Repository::open_bare(&path).map_err(Error::git)?
        } else if options.create {
            std::fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
            git2::Repository::init_bare(&path).map_err(Error::git)?
        } else {
            return Err(Error::not_found(format!(
                "store not found: {}",
                path.display()
            )));
        };

        if repo.find_reference(LEDGER_REF).is_err() {
            if !options.create {
                return Err(Error::not_found(format!(
                    "no ledger in {}",
                    path.display()
                )));
            }
            Self::init_ledger(&repo, &sig)?;
            info!("initialized store at {}", path.display());
        }

        Ok(Store {
            inner: Arc::new(StoreInner {
                repo: Mutex::new(repo),
                path,
                signature: sig,
                retries: options.retries.unwrap_or(DEFAULT_RETRIES),
            }),
        })
    }

    /// Create the initial ledger commit with an empty tree.
    fn init_ledger(repo: &git2::Repository, sig: &Signature) -> Result<()> {
        let tree_oid = tree::empty_tree(repo)?;
        let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
        let actor = git2::Signature::now(&sig.name, &sig.email).map_err(Error::git)?;
        let commit_oid = repo
            .commit(None, &actor, &actor, "Initialize ledger", &tree, &[])
            .map_err(Error::git)?;
        repo.reference(LEDGER_REF, commit_oid, false, "init: ledger")
            .map_err(Error::git)?;
        Ok(())
    }

    /// A read view of the latest published state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let repo = self
            .inner
            .repo
            .lock()
            .map_err(|e| Error::git_msg(e.to_string()))?;
        let commit = repo
            .find_reference(LEDGER_REF)
            .and_then(|r| r.peel_to_commit())
            .map_err(Error::git)?;
        let commit_oid = commit.id();
        let tree_oid = commit.tree_id();
        drop(commit);
        drop(repo);

        Ok(Snapshot {
            inner: Arc::clone(&self.inner),
            commit_oid,
            tree_oid,
        })
    }

    /// Open a transaction on the latest published state.
    pub fn begin(&self) -> Result<Transaction> {
        Ok(Transaction::new(self.snapshot()?))
    }

    /// Run `f` in a fresh transaction, rerunning it on conflicts.
    ///
    /// `f` stages its writes and returns a value plus the ledger message; the
    /// transaction is published afterwards. Uses the store's configured
    /// retry budget.
    pub fn write<F, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction) -> Result<(T, String)>,
    {
        retry_write(self.inner.retries, || {
            let mut txn = self.begin()?;
            let (value, message) = f(&mut txn)?;
            txn.commit(&message)?;
            Ok(value)
        })
    }

    /// The repository registry.
    pub fn repositories(&self) -> Repositories<'_> {
        Repositories::new(self)
    }

    /// Branches of `repo`.
    pub fn branches(&self, repo: RepositoryId) -> Branches<'_> {
        Branches::new(self, repo)
    }

    /// Explicit access grants on `repo`.
    pub fn grants(&self, repo: RepositoryId) -> Grants<'_> {
        Grants::new(self, repo)
    }

    /// Path to the bare repository on disk.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Store({})", self.inner.path.display())
    }
}

/// Retry a write operation on stale-snapshot errors.
///
/// Runs `f` up to `retries + 1` times with bounded, jittered exponential
/// backoff.
pub fn retry_write<F, T>(retries: u32, mut f: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < retries => {
                warn!("write conflict, retrying (attempt {}): {}", attempt + 1, e);
                std::thread::sleep(backoff(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Delay before rerun number `attempt + 1`: `10ms * 2^attempt`, capped at
/// 200ms, plus up to half that again at random.
pub(crate) fn backoff(attempt: u32) -> Duration {
    let base = (10 * 2u64.pow(attempt.min(10))).min(200);
    let jitter = rand::rng().random_range(0..=base / 2);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_stays_bounded() {
        for _ in 0..20 {
            let first = backoff(0).as_millis();
            assert!((10..=15).contains(&first), "{}", first);
            let late = backoff(30).as_millis();
            assert!((200..=300).contains(&late), "{}", late);
        }
    }
}
