use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::lock::with_store_lock;
use crate::paths;
use crate::snapshot::{Reader, Snapshot};
use crate::store::LEDGER_REF;
use crate::tree;
use crate::types::Sequences;

/// Id sequences a transaction can draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Repository,
    Branch,
    Commit,
    Change,
}

/// Accumulates row writes on top of a snapshot and publishes them atomically.
///
/// Reads through a transaction see its own staged writes. `commit(self)`
/// takes ownership, so nothing can be written after publishing; dropping a
/// transaction without committing discards every staged write.
pub struct Transaction {
    pub(crate) base: Snapshot,
    pub(crate) writes: BTreeMap<String, Option<Vec<u8>>>,
    pub(crate) sequences: Option<Sequences>,
}

impl Transaction {
    pub(crate) fn new(base: Snapshot) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
            sequences: None,
        }
    }

    /// Allocate the next id of `table`.
    pub fn next_id(&mut self, table: Table) -> Result<u64> {
        let mut seq = match self.sequences {
            Some(seq) => seq,
            None => self.base.sequences()?,
        };
        let slot = match table {
            Table::Repository => &mut seq.repository,
            Table::Branch => &mut seq.branch,
            Table::Commit => &mut seq.commit,
            Table::Change => &mut seq.change,
        };
        *slot += 1;
        let id = *slot;
        self.sequences = Some(seq);
        self.put_row(paths::SEQUENCES_KEY, &seq)?;
        Ok(id)
    }

    /// Stage `row` as JSON at `key`, replacing any earlier staged value.
    pub fn put_row<T: Serialize>(&mut self, key: &str, row: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(row)?;
        self.writes.insert(key.to_string(), Some(bytes));
        Ok(())
    }

    /// Stage the removal of the row at `key`.
    pub fn remove_row(&mut self, key: &str) -> Result<()> {
        if self.read_raw(key)?.is_none() {
            return Err(Error::not_found(key.to_string()));
        }
        if self.base.read_raw(key)?.is_some() {
            self.writes.insert(key.to_string(), None);
        } else {
            self.writes.remove(key);
        }
        Ok(())
    }

    /// Returns `true` if nothing has been staged.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Publish every staged write as one ledger commit.
    ///
    /// Returns the snapshot of the new state. An empty transaction publishes
    /// nothing and returns its base.
    ///
    /// # Errors
    /// Returns [`Error::StaleSnapshot`] if another writer published after this
    /// transaction was opened. Nothing is written in that case; the caller
    /// may rerun the whole unit of work.
    pub fn commit(self, message: &str) -> Result<Snapshot> {
        if self.writes.is_empty() {
            return Ok(self.base);
        }

        let inner = Arc::clone(&self.base.inner);
        let base_commit = self.base.commit_oid;
        let base_tree = self.base.tree_oid;
        let writes = self.writes;

        let (commit_oid, tree_oid) = self.base.with_repo(|repo| {
            with_store_lock(&inner.path, || {
                let current = repo
                    .find_reference(LEDGER_REF)
                    .map_err(Error::git)?
                    .target()
                    .ok_or_else(|| Error::integrity("ledger ref is symbolic"))?;
                if current != base_commit {
                    return Err(Error::stale_snapshot(format!(
                        "ledger has moved: expected {}, found {}",
                        base_commit, current
                    )));
                }

                let tree_oid = tree::rebuild_tree(repo, base_tree, &writes)?;
                let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
                let parent = repo.find_commit(current).map_err(Error::git)?;
                let sig = git2::Signature::now(&inner.signature.name, &inner.signature.email)
                    .map_err(Error::git)?;
                let commit_oid = repo
                    .commit(None, &sig, &sig, message, &tree, &[&parent])
                    .map_err(Error::git)?;

                repo.reference_matching(
                    LEDGER_REF,
                    commit_oid,
                    true,
                    current,
                    &format!("commit: {}", message),
                )
                .map_err(Error::git)?;

                Ok((commit_oid, tree_oid))
            })
        })?;

        debug!("ledger advanced to {} ({} rows)", commit_oid, writes.len());
        Ok(Snapshot {
            inner,
            commit_oid,
            tree_oid,
        })
    }
}

impl Reader for Transaction {
    fn read_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => self.base.read_raw(key),
        }
    }

    fn list_raw(&self, dir: &str) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self.base.list_raw(dir)?.into_iter().collect();
        let prefix = format!("{}/", dir);
        for (key, value) in self.writes.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            // Only leaf rows are ever removed, so a removal hides exactly
            // one name in its own directory.
            match (rest.split_once('/'), value) {
                (Some((child, _)), _) => {
                    names.insert(child.to_string());
                }
                (None, Some(_)) => {
                    names.insert(rest.to_string());
                }
                (None, None) => {
                    names.remove(rest);
                }
            }
        }
        Ok(names.into_iter().collect())
    }
}
