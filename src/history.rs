//! History reconstruction.
//!
//! A path's rows form a chain: each diff row names the row it was computed
//! against. Reconstruction walks that chain back to the nearest full
//! snapshot and replays the patches forward. The walk is an explicit loop
//! that must move to a strictly older row at every step, so it terminates
//! and uses no stack proportional to history depth.

use std::collections::{BTreeMap, HashMap};

use log::debug;
use serde::Serialize;

use crate::classify;
use crate::diff;
use crate::error::{Error, Result};
use crate::paths;
use crate::snapshot::Reader;
use crate::types::{ChangeId, ChangeKind, CommitId, CommitRecord, FileChange, RepositoryId};

/// The materialized content of a path at some version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    pub content: Vec<u8>,
    pub is_code: bool,
    pub is_binary: bool,
    /// Commit that produced this version.
    pub commit: CommitId,
    /// Row that produced this version.
    pub change: ChangeId,
}

impl ResolvedFile {
    /// The content as text.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for binary files.
    pub fn text(&self) -> Result<&str> {
        if self.is_binary {
            return Err(Error::validation(format!("'{}' is binary", self.path)));
        }
        std::str::from_utf8(&self.content)
            .map_err(|e| Error::integrity(format!("'{}' is not UTF-8: {}", self.path, e)))
    }
}

/// The latest live version of a path in the stored (text) form the Commit
/// Writer diffs against.
#[derive(Debug, Clone)]
pub(crate) struct Prior {
    pub change: ChangeId,
    pub content: String,
    pub is_binary: bool,
}

/// Reconstruct the current content of `path` in `repo`.
///
/// # Errors
/// * [`Error::NotFound`] if the path was never committed or its latest
///   change is a deletion.
/// * [`Error::Integrity`] if the chain is broken or a patch does not apply.
pub fn resolve<R: Reader>(reader: &R, repo: RepositoryId, path: &str) -> Result<ResolvedFile> {
    let path = paths::normalize_path(path)?;
    let rows = reader.chain(repo, &path)?;
    let latest = rows.len().checked_sub(1);
    materialize(&rows, latest, &path)
}

/// Reconstruct `path` as it was right after commit `at`.
///
/// Uses the newest row whose commit is `at` or older.
pub fn resolve_at<R: Reader>(
    reader: &R,
    repo: RepositoryId,
    path: &str,
    at: CommitId,
) -> Result<ResolvedFile> {
    let path = paths::normalize_path(path)?;
    let rows = reader.chain(repo, &path)?;
    let index = rows.iter().rposition(|r| r.commit <= at);
    materialize(&rows, index, &path)
}

/// Every stored row of `path`, oldest first.
pub fn versions<R: Reader>(reader: &R, repo: RepositoryId, path: &str) -> Result<Vec<FileChange>> {
    let path = paths::normalize_path(path)?;
    reader.chain(repo, &path)
}

/// The latest live version of `path`, or `None` if it has never been
/// committed or was deleted.
pub(crate) fn prior_version<R: Reader>(
    reader: &R,
    repo: RepositoryId,
    path: &str,
) -> Result<Option<Prior>> {
    let rows = reader.chain(repo, path)?;
    let Some(latest) = rows.last() else {
        return Ok(None);
    };
    if latest.change_kind == ChangeKind::Deleted {
        return Ok(None);
    }
    let content = reconstruct(&rows, rows.len() - 1)?;
    Ok(Some(Prior {
        change: latest.id,
        content,
        is_binary: latest.content_change.is_binary,
    }))
}

fn materialize(rows: &[FileChange], index: Option<usize>, path: &str) -> Result<ResolvedFile> {
    let Some(index) = index else {
        return Err(Error::not_found(format!("file '{}'", path)));
    };
    let row = &rows[index];
    if row.change_kind == ChangeKind::Deleted {
        return Err(Error::not_found(format!("file '{}' was deleted", path)));
    }
    let text = reconstruct(rows, index)?;
    Ok(ResolvedFile {
        path: path.to_string(),
        content: classify::decode_content(text, row.content_change.is_binary)?,
        is_code: row.content_change.is_code,
        is_binary: row.content_change.is_binary,
        commit: row.commit,
        change: row.id,
    })
}

/// Stored-form content of `rows[start]`.
///
/// Walks predecessor links back to the nearest full row, then applies the
/// collected patches oldest first.
pub(crate) fn reconstruct(rows: &[FileChange], start: usize) -> Result<String> {
    let by_id: HashMap<ChangeId, usize> = rows.iter().enumerate().map(|(i, r)| (r.id, i)).collect();

    let mut patches: Vec<&FileChange> = Vec::new();
    let mut current = &rows[start];
    let base = loop {
        if !current.content_change.is_diff {
            if current.change_kind == ChangeKind::Deleted && !patches.is_empty() {
                return Err(Error::integrity(format!(
                    "diff chained onto deletion {} of '{}'",
                    current.id, current.path
                )));
            }
            break current.content_change.content.clone();
        }
        if current.content_change.is_binary {
            return Err(Error::integrity(format!(
                "binary change {} of '{}' is stored as a diff",
                current.id, current.path
            )));
        }

        let previous = current.previous.ok_or_else(|| {
            Error::integrity(format!(
                "diff change {} of '{}' has no predecessor",
                current.id, current.path
            ))
        })?;
        if previous >= current.id {
            return Err(Error::integrity(format!(
                "change {} of '{}' points forward to {}",
                current.id, current.path, previous
            )));
        }
        let older = by_id.get(&previous).ok_or_else(|| {
            Error::integrity(format!(
                "change {} of '{}' points to missing change {}",
                current.id, current.path, previous
            ))
        })?;

        patches.push(current);
        current = &rows[*older];
    };

    debug!(
        "reconstructing '{}' from change {} with {} patches",
        current.path,
        current.id,
        patches.len()
    );

    let mut content = base;
    for row in patches.iter().rev() {
        content = diff::apply_patch(&content, &row.content_change.content).map_err(|e| {
            Error::integrity(format!(
                "change {} of '{}' does not apply: {}",
                row.id, row.path, e
            ))
        })?;
    }
    Ok(content)
}

// ---------------------------------------------------------------------------
// Commit log
// ---------------------------------------------------------------------------

/// A commit together with the rows it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggedCommit {
    pub commit: CommitRecord,
    pub changes: Vec<FileChange>,
}

/// Every commit of `repo`, newest first, with its per-file rows.
pub fn commit_log<R: Reader>(reader: &R, repo: RepositoryId) -> Result<Vec<LoggedCommit>> {
    let mut by_commit: BTreeMap<CommitId, Vec<FileChange>> = BTreeMap::new();
    for path in reader.chain_paths(repo)? {
        for row in reader.chain(repo, &path)? {
            by_commit.entry(row.commit).or_default().push(row);
        }
    }

    let mut log = Vec::new();
    for commit in reader.commits(repo)? {
        let mut changes = by_commit.remove(&commit.id).unwrap_or_default();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        log.push(LoggedCommit { commit, changes });
    }
    if let Some(orphan) = by_commit.keys().next() {
        return Err(Error::integrity(format!(
            "changes reference missing commit {}",
            orphan
        )));
    }
    log.sort_by(|a, b| {
        b.commit
            .created_at
            .cmp(&a.commit.created_at)
            .then(b.commit.id.cmp(&a.commit.id))
    });
    Ok(log)
}
