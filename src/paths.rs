use crate::error::{Error, Result};
use crate::types::{BranchId, ChangeId, CommitId, RepositoryId, UserId};

/// Normalize a committed file path: strip leading/trailing slashes, reject
/// `..` segments, and collapse repeated slashes and `.` markers.
///
/// # Errors
/// Returns [`Error::InvalidPath`] if the path is empty after normalization
/// or contains `..`.
pub fn normalize_path(path: &str) -> Result<String> {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        if seg.is_empty() || seg == "." {
            continue;
        }
        if seg == ".." {
            return Err(Error::invalid_path(format!(
                "path segment '{}' is not allowed",
                seg,
            )));
        }
        segments.push(seg);
    }

    if segments.is_empty() {
        return Err(Error::invalid_path("path must not be empty"));
    }

    Ok(segments.join("/"))
}

/// Validate a branch name.
///
/// Rejects empty names, slashes at either end, whitespace, control
/// characters, `..`, `@{`, a trailing `.` and a `.lock` suffix, following
/// git's `check-ref-format` rules.
///
/// # Errors
/// Returns [`Error::InvalidBranchName`] if the name violates any rule.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_branch_name("branch name must not be empty"));
    }

    for ch in name.chars() {
        if ch.is_whitespace() || ch.is_control() {
            return Err(Error::invalid_branch_name(format!(
                "branch name contains invalid character: {:?}",
                ch,
            )));
        }
        if matches!(ch, ':' | '\\' | '^' | '~' | '?' | '*' | '[') {
            return Err(Error::invalid_branch_name(format!(
                "branch name contains invalid character: {:?}",
                ch,
            )));
        }
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(Error::invalid_branch_name(
            "branch name must not start or end with '/'",
        ));
    }

    if name.contains("..") {
        return Err(Error::invalid_branch_name(
            "branch name must not contain '..'",
        ));
    }

    if name.contains("@{") {
        return Err(Error::invalid_branch_name(
            "branch name must not contain '@{'",
        ));
    }

    if name.ends_with('.') {
        return Err(Error::invalid_branch_name(
            "branch name must not end with '.'",
        ));
    }

    if name.ends_with(".lock") {
        return Err(Error::invalid_branch_name(
            "branch name must not end with '.lock'",
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger keys
// ---------------------------------------------------------------------------
//
// Row file names are zero-padded so that git's byte-wise tree ordering
// matches numeric id ordering.

pub(crate) const SEQUENCES_KEY: &str = "meta/sequences.json";

fn row_name(id: u64) -> String {
    format!("{:020}.json", id)
}

/// Parse a row file name back into its id.
pub(crate) fn row_id(name: &str) -> Option<u64> {
    name.strip_suffix(".json")?.parse().ok()
}

pub(crate) fn repository_key(id: RepositoryId) -> String {
    format!("repositories/{}", row_name(id.0))
}

pub(crate) const REPOSITORIES_DIR: &str = "repositories";

pub(crate) fn grants_dir(repo: RepositoryId) -> String {
    format!("grants/{}", repo.0)
}

pub(crate) fn grant_key(repo: RepositoryId, user: UserId) -> String {
    format!("{}/{}", grants_dir(repo), row_name(user.0))
}

pub(crate) fn branches_dir(repo: RepositoryId) -> String {
    format!("branches/{}", repo.0)
}

pub(crate) fn branch_key(repo: RepositoryId, id: BranchId) -> String {
    format!("{}/{}", branches_dir(repo), row_name(id.0))
}

pub(crate) const COMMITS_DIR: &str = "commits";

pub(crate) fn commit_key(id: CommitId) -> String {
    format!("{}/{}", COMMITS_DIR, row_name(id.0))
}

pub(crate) fn commit_hash_key(hash: &str) -> String {
    format!("hashes/{}", hash)
}

pub(crate) fn changes_root(repo: RepositoryId) -> String {
    format!("changes/{}", repo.0)
}

/// Directory holding one path's diff chain.
///
/// The path is hex-encoded so that any file path maps to a single tree
/// entry name.
pub(crate) fn chain_dir(repo: RepositoryId, path: &str) -> String {
    format!("{}/{}", changes_root(repo), hex::encode(path.as_bytes()))
}

pub(crate) fn change_key(repo: RepositoryId, path: &str, id: ChangeId) -> String {
    format!("{}/{}", chain_dir(repo, path), row_name(id.0))
}

/// Decode a chain directory name back into the file path.
pub(crate) fn chain_path(dir_name: &str) -> Option<String> {
    let bytes = hex::decode(dir_name).ok()?;
    String::from_utf8(bytes).ok()
}
