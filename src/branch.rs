//! Branches: named, append-only sequences of commits within a repository.
//!
//! A branch is `Active` from creation until it is deleted, which only flips
//! it to inactive. Inactive branches are kept but invisible to every
//! operation here, so their name can be reused by a new branch.

use chrono::Utc;
use log::info;

use crate::error::{Error, Result};
use crate::paths;
use crate::snapshot::Reader;
use crate::store::Store;
use crate::transaction::{Table, Transaction};
use crate::types::{Branch, BranchId, CommitId, CommitRecord, RepositoryId};

/// A transient view over the branches of one repository.
///
/// `store.branches(repo)` returns one.
pub struct Branches<'a> {
    store: &'a Store,
    repo: RepositoryId,
}

impl<'a> Branches<'a> {
    pub(crate) fn new(store: &'a Store, repo: RepositoryId) -> Self {
        Self { store, repo }
    }

    /// Create an active branch with no commits.
    ///
    /// # Errors
    /// * [`Error::InvalidBranchName`] if `name` is not a valid branch name.
    /// * [`Error::NotFound`] if the repository does not exist.
    /// * [`Error::Permission`] if the repository is inactive.
    /// * [`Error::KeyExists`] if an active branch already has this name.
    pub fn create(&self, name: &str, description: &str) -> Result<Branch> {
        paths::validate_branch_name(name)?;
        let repo_id = self.repo;

        let branch = self.store.write(|txn| {
            let repo = txn
                .repository(repo_id)?
                .ok_or_else(|| Error::not_found(format!("repository {}", repo_id)))?;
            if !repo.active {
                return Err(Error::permission(format!(
                    "repository '{}' is inactive",
                    repo.name
                )));
            }
            if find_active(&*txn, repo_id, name)?.is_some() {
                return Err(Error::key_exists(format!("branch '{}' already exists", name)));
            }

            let id = BranchId(txn.next_id(Table::Branch)?);
            let branch = Branch {
                id,
                repository: repo_id,
                name: name.to_string(),
                description: description.to_string(),
                created_at: Utc::now(),
                commit_ids: Vec::new(),
                head: None,
                active: true,
            };
            txn.put_row(&paths::branch_key(repo_id, id), &branch)?;
            Ok((branch, format!("create branch '{}' in repository {}", name, repo_id)))
        })?;

        info!("created branch '{}' in repository {}", name, repo_id);
        Ok(branch)
    }

    /// Soft-delete the active branch `name`.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if no active branch has this name.
    pub fn delete(&self, name: &str) -> Result<()> {
        let repo_id = self.repo;
        self.store.write(|txn| {
            let mut branch = find_active(&*txn, repo_id, name)?.ok_or_else(|| {
                Error::not_found(format!("branch '{}' not found or already deleted", name))
            })?;
            branch.active = false;
            txn.put_row(&paths::branch_key(repo_id, branch.id), &branch)?;
            Ok(((), format!("delete branch '{}' in repository {}", name, repo_id)))
        })?;
        info!("deleted branch '{}' in repository {}", name, repo_id);
        Ok(())
    }

    /// The active branch `name`.
    pub fn get(&self, name: &str) -> Result<Branch> {
        find_active(&self.store.snapshot()?, self.repo, name)?
            .ok_or_else(|| Error::not_found(format!("branch '{}' not found or is inactive", name)))
    }

    /// Returns `true` if an active branch has this name.
    pub fn has(&self, name: &str) -> Result<bool> {
        Ok(find_active(&self.store.snapshot()?, self.repo, name)?.is_some())
    }

    /// All active branches, newest first.
    pub fn list(&self) -> Result<Vec<Branch>> {
        let mut branches: Vec<Branch> = self
            .store
            .snapshot()?
            .branches(self.repo)?
            .into_iter()
            .filter(|b| b.active)
            .collect();
        branches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(branches)
    }

    /// Append an existing commit to the active branch `name` and move its
    /// head there.
    pub fn append_commit(&self, name: &str, commit: CommitId) -> Result<Branch> {
        let repo_id = self.repo;
        let branch = self.store.write(|txn| {
            let branch = append_commit(txn, repo_id, name, commit)?;
            Ok((branch, format!("append commit {} to branch '{}'", commit, name)))
        })?;
        info!("appended commit {} to branch '{}'", commit, name);
        Ok(branch)
    }

    /// Commits referenced by the active branch `name`, most recent first.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the branch does not exist or is inactive,
    /// and [`Error::Integrity`] if it references a missing commit.
    pub fn commits(&self, name: &str) -> Result<Vec<CommitRecord>> {
        let snap = self.store.snapshot()?;
        let branch = find_active(&snap, self.repo, name)?.ok_or_else(|| {
            Error::not_found(format!("branch '{}' not found or is inactive", name))
        })?;

        let mut commits = Vec::with_capacity(branch.commit_ids.len());
        for id in &branch.commit_ids {
            let commit = snap.commit_record(*id)?.ok_or_else(|| {
                Error::integrity(format!("branch '{}' references missing commit {}", name, id))
            })?;
            commits.push(commit);
        }
        commits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(commits)
    }
}

/// The active branch `name` of `repo`, if any.
pub(crate) fn find_active<R: Reader>(
    reader: &R,
    repo: RepositoryId,
    name: &str,
) -> Result<Option<Branch>> {
    Ok(reader
        .branches(repo)?
        .into_iter()
        .find(|b| b.active && b.name == name))
}

/// Stage an append of `commit` to the active branch `name`.
///
/// The commit must belong to the branch's repository and must not already be
/// on the branch.
pub(crate) fn append_commit(
    txn: &mut Transaction,
    repo: RepositoryId,
    name: &str,
    commit: CommitId,
) -> Result<Branch> {
    let mut branch = find_active(&*txn, repo, name)?.ok_or_else(|| {
        Error::not_found(format!("branch '{}' not found or is inactive", name))
    })?;
    let record = txn
        .commit_record(commit)?
        .ok_or_else(|| Error::not_found(format!("commit {}", commit)))?;
    if record.repository != repo {
        return Err(Error::validation(format!(
            "commit {} belongs to another repository",
            commit
        )));
    }
    if branch.commit_ids.contains(&commit) {
        return Err(Error::key_exists(format!(
            "commit {} is already on branch '{}'",
            commit, name
        )));
    }

    branch.commit_ids.push(commit);
    branch.head = Some(commit);
    txn.put_row(&paths::branch_key(repo, branch.id), &branch)?;
    Ok(branch)
}
