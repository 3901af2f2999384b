//! The commit path: turn a batch of incoming files into one commit and its
//! per-file change rows.
//!
//! Every decision for the batch (full snapshot or diff, added or modified)
//! is made inside the same transaction that publishes the rows. If another
//! writer publishes first, the transaction fails as stale and the whole
//! request is rerun against the new state, so a diff is never appended to a
//! base that is no longer the latest version of its path.

use std::collections::BTreeSet;

use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::access::AccessControl;
use crate::branch;
use crate::classify;
use crate::diff;
use crate::error::{Error, Result};
use crate::history::{self, Prior};
use crate::paths;
use crate::snapshot::Reader;
use crate::store::Store;
use crate::transaction::{Table, Transaction};
use crate::types::{
    ChangeId, ChangeKind, CommitId, CommitRecord, ContentChange, FileChange, Repository,
    RepositoryId, UserId,
};

/// Length of a commit hash in hex characters.
pub const COMMIT_HASH_LEN: usize = 40;

/// Split a comma-separated tag list.
///
/// Entries are trimmed; empty entries and repeats are dropped, first
/// occurrence wins.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// A fresh commit hash.
///
/// SHA-256 over the current time in nanoseconds and 32 random bytes,
/// hex-encoded and truncated to [`COMMIT_HASH_LEN`]. Two commits with the
/// same files still get different hashes.
pub fn generate_commit_hash() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let token: [u8; 32] = rand::random();
    let mut hasher = Sha256::new();
    hasher.update(format!("{}-{}", nanos, hex::encode(token)).as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(COMMIT_HASH_LEN);
    digest
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// One named blob in a commit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub path: String,
    /// `None` marks a deletion.
    pub data: Option<Vec<u8>>,
}

impl IncomingFile {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: Some(data.into()),
        }
    }

    pub fn deletion(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            data: None,
        }
    }
}

/// Everything a caller submits to create one commit.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Repository name.
    pub repository: String,
    /// Restricts the name lookup to repositories of this owner.
    pub owner: Option<UserId>,
    pub message: String,
    pub tags: Vec<String>,
    /// Active branch the new commit is appended to.
    pub branch: Option<String>,
    pub files: Vec<IncomingFile>,
}

impl CommitRequest {
    pub fn new(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Set tags from a comma-separated list.
    pub fn tags(mut self, raw: &str) -> Self {
        self.tags = parse_tags(raw);
        self
    }

    pub fn branch(mut self, name: impl Into<String>) -> Self {
        self.branch = Some(name.into());
        self
    }

    pub fn file(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.files.push(IncomingFile::new(path, data));
        self
    }

    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.files.push(IncomingFile::deletion(path));
        self
    }
}

/// How one incoming file was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedFile {
    pub path: String,
    pub change_kind: ChangeKind,
    pub is_code: bool,
    pub is_binary: bool,
    pub is_diff: bool,
    /// The stored payload: full content, a patch, or empty for a deletion.
    pub content: String,
}

/// Result of a successful commit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub commit: CommitRecord,
    pub files: Vec<ProcessedFile>,
}

impl CommitOutcome {
    pub fn id(&self) -> CommitId {
        self.commit.id
    }

    pub fn hash(&self) -> &str {
        &self.commit.hash
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// A file after request validation, before it meets the store.
struct Prepared {
    path: String,
    is_code: bool,
    is_binary: bool,
    /// Encoded full content; `None` for a deletion.
    body: Option<String>,
}

/// A per-file decision, made against the transaction's view of history.
struct Planned<'a> {
    prepared: &'a Prepared,
    kind: ChangeKind,
    previous: Option<ChangeId>,
    content: ContentChange,
}

/// Creates commits in a [`Store`], asking `A` who may write.
pub struct CommitWriter<A> {
    store: Store,
    access: A,
}

impl<A: AccessControl> CommitWriter<A> {
    pub fn new(store: Store, access: A) -> Self {
        Self { store, access }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Create one commit from `request` on behalf of `author`.
    ///
    /// Nothing is published unless every file is processed; a rejected
    /// request leaves no commit, change or branch update behind.
    ///
    /// # Errors
    /// * [`Error::Validation`] for a missing repository name, message or
    ///   files, a repeated path, text that is not UTF-8, or a deletion of a
    ///   path with no live version.
    /// * [`Error::InvalidPath`] for a path that does not normalize.
    /// * [`Error::NotFound`] if no repository has the requested name, or the
    ///   requested branch is missing or inactive.
    /// * [`Error::Permission`] if the repository is inactive or `author`
    ///   holds no write access.
    /// * [`Error::Integrity`] if a prior version cannot be reconstructed.
    pub fn commit(&self, author: UserId, request: &CommitRequest) -> Result<CommitOutcome> {
        let name = request.repository.trim();
        if name.is_empty() {
            return Err(Error::validation("repository name is required"));
        }
        if request.message.trim().is_empty() {
            return Err(Error::validation("commit message is required"));
        }
        if request.files.is_empty() {
            return Err(Error::validation("at least one file is required"));
        }
        let prepared = prepare(&request.files)?;

        let repo = self.target_repository(name, request.owner, author)?;
        let repo_id = repo.id;

        let outcome = self.store.write(|txn| {
            let current = txn
                .repository(repo_id)?
                .ok_or_else(|| Error::not_found(format!("repository {}", repo_id)))?;
            if !current.active {
                return Err(Error::permission(format!(
                    "repository '{}' is inactive",
                    current.name
                )));
            }
            if !self.access.can_write(&current, author)? {
                return Err(Error::permission(format!(
                    "user {} has no write access to repository '{}'",
                    author, current.name
                )));
            }

            let plans = plan(&*txn, repo_id, &prepared)?;
            let outcome = publish(txn, repo_id, author, request, plans)?;
            let msg = format!(
                "commit {} to repository {}: {}",
                outcome.commit.hash,
                repo_id,
                request.message.lines().next().unwrap_or_default()
            );
            Ok((outcome, msg))
        })?;

        info!(
            "commit {} ({}) by user {} to repository '{}': {} files",
            outcome.commit.id,
            outcome.commit.hash,
            author,
            repo.name,
            outcome.files.len()
        );
        Ok(outcome)
    }

    /// Pick the repository a request names.
    ///
    /// Among active repositories with the name, the author's own is tried
    /// first, then any other the author may write to.
    fn target_repository(
        &self,
        name: &str,
        owner: Option<UserId>,
        author: UserId,
    ) -> Result<Repository> {
        let mut named: Vec<Repository> = self
            .store
            .snapshot()?
            .repositories()?
            .into_iter()
            .filter(|r| r.name == name && owner.map_or(true, |o| r.owner == o))
            .collect();
        if named.is_empty() {
            return Err(Error::not_found(format!("repository '{}'", name)));
        }

        named.retain(|r| r.active);
        if named.is_empty() {
            return Err(Error::permission(format!(
                "repository '{}' is inactive",
                name
            )));
        }

        named.sort_by_key(|r| (r.owner != author, r.id));
        for repo in named {
            if self.access.can_write(&repo, author)? {
                return Ok(repo);
            }
        }
        Err(Error::permission(format!(
            "user {} has no write access to repository '{}'",
            author, name
        )))
    }
}

/// Normalize paths and encode content for every incoming file.
fn prepare(files: &[IncomingFile]) -> Result<Vec<Prepared>> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let path = paths::normalize_path(&file.path)?;
        if !seen.insert(path.clone()) {
            return Err(Error::validation(format!(
                "'{}' appears more than once",
                path
            )));
        }
        let is_code = classify::is_code(&path);
        let (is_binary, body) = match &file.data {
            None => (false, None),
            Some(data) if classify::is_binary(data) => {
                (true, Some(classify::encode_content(data, true)?))
            }
            Some(data) => {
                let text = classify::encode_content(data, false).map_err(|e| {
                    Error::validation(format!("'{}': {}", path, e))
                })?;
                let text = if is_code {
                    classify::normalize_code(&text)
                } else {
                    text
                };
                (false, Some(text))
            }
        };
        out.push(Prepared {
            path,
            is_code,
            is_binary,
            body,
        });
    }
    Ok(out)
}

/// Decide how each prepared file is stored, before anything is staged.
fn plan<'a, R: Reader>(
    reader: &R,
    repo: RepositoryId,
    prepared: &'a [Prepared],
) -> Result<Vec<Planned<'a>>> {
    prepared
        .iter()
        .map(|p| {
            let prior = history::prior_version(reader, repo, &p.path)?;
            decide(p, prior)
        })
        .collect()
}

fn decide(p: &Prepared, prior: Option<Prior>) -> Result<Planned<'_>> {
    let previous = prior.as_ref().map(|pr| pr.change);
    let kind = if prior.is_some() {
        ChangeKind::Modified
    } else {
        ChangeKind::Added
    };

    let Some(body) = &p.body else {
        let prior = prior.ok_or_else(|| {
            Error::validation(format!("cannot delete '{}': no live version", p.path))
        })?;
        debug!("'{}': deleted", p.path);
        return Ok(Planned {
            prepared: p,
            kind: ChangeKind::Deleted,
            previous,
            content: ContentChange {
                content: String::new(),
                is_code: p.is_code,
                is_binary: prior.is_binary,
                is_diff: false,
            },
        });
    };

    let (content, is_diff) = match prior {
        Some(prior) if !p.is_binary && !prior.is_binary => {
            (diff::compute_diff(&prior.content, body), true)
        }
        _ => (body.clone(), false),
    };
    debug!(
        "'{}': {:?} stored as {}",
        p.path,
        kind,
        if is_diff { "diff" } else { "full content" }
    );

    Ok(Planned {
        prepared: p,
        kind,
        previous,
        content: ContentChange {
            content,
            is_code: p.is_code,
            is_binary: p.is_binary,
            is_diff,
        },
    })
}

/// Stage the commit row, one change row per plan and the branch append.
fn publish(
    txn: &mut Transaction,
    repo: RepositoryId,
    author: UserId,
    request: &CommitRequest,
    plans: Vec<Planned<'_>>,
) -> Result<CommitOutcome> {
    let id = CommitId(txn.next_id(Table::Commit)?);
    let hash = unique_hash(&*txn)?;
    let record = CommitRecord {
        id,
        repository: repo,
        author,
        hash: hash.clone(),
        message: request.message.clone(),
        tags: request.tags.clone(),
        created_at: Utc::now(),
    };
    txn.put_row(&paths::commit_key(id), &record)?;
    txn.put_row(&paths::commit_hash_key(&hash), &id)?;

    let mut files = Vec::with_capacity(plans.len());
    for planned in plans {
        let change_id = ChangeId(txn.next_id(Table::Change)?);
        let path = planned.prepared.path.clone();
        let row = FileChange {
            id: change_id,
            commit: id,
            repository: repo,
            path: path.clone(),
            change_kind: planned.kind,
            previous: planned.previous,
            content_change: planned.content,
        };
        txn.put_row(&paths::change_key(repo, &path, change_id), &row)?;
        files.push(ProcessedFile {
            path,
            change_kind: row.change_kind,
            is_code: row.content_change.is_code,
            is_binary: row.content_change.is_binary,
            is_diff: row.content_change.is_diff,
            content: row.content_change.content,
        });
    }

    if let Some(name) = &request.branch {
        branch::append_commit(txn, repo, name, id)?;
    }

    Ok(CommitOutcome {
        commit: record,
        files,
    })
}

fn unique_hash<R: Reader>(reader: &R) -> Result<String> {
    for _ in 0..3 {
        let hash = generate_commit_hash();
        if reader.commit_by_hash(&hash)?.is_none() {
            return Ok(hash);
        }
    }
    Err(Error::key_exists("could not generate a unique commit hash"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_split_trimmed_and_deduplicated() {
        assert_eq!(parse_tags("a, b,,c , a"), vec!["a", "b", "c"]);
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ,").is_empty());
    }

    #[test]
    fn hashes_are_fixed_length_hex_and_fresh() {
        let a = generate_commit_hash();
        let b = generate_commit_hash();
        assert_eq!(a.len(), COMMIT_HASH_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn prepare_rejects_duplicates_after_normalization() {
        let files = vec![
            IncomingFile::new("src/a.txt", "x"),
            IncomingFile::new("/src//a.txt", "y"),
        ];
        assert!(matches!(prepare(&files), Err(Error::Validation(_))));
    }

    #[test]
    fn prepare_normalizes_code_only() {
        let files = vec![
            IncomingFile::new("main.go", "  a\n\n b \n"),
            IncomingFile::new("notes.txt", "  a\n\n b \n"),
        ];
        let out = prepare(&files).unwrap();
        assert_eq!(out[0].body.as_deref(), Some("a\nb"));
        assert_eq!(out[1].body.as_deref(), Some("  a\n\n b \n"));
    }

    #[test]
    fn binary_after_text_is_a_full_snapshot() {
        let p = Prepared {
            path: "logo.png".into(),
            is_code: false,
            is_binary: true,
            body: Some("AAEC".into()),
        };
        let prior = Prior {
            change: ChangeId(1),
            content: "text".into(),
            is_binary: false,
        };
        let planned = decide(&p, Some(prior)).unwrap();
        assert_eq!(planned.kind, ChangeKind::Modified);
        assert_eq!(planned.previous, Some(ChangeId(1)));
        assert!(!planned.content.is_diff);
    }
}
