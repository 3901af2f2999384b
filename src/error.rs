use std::path::PathBuf;

/// All errors produced by uvcs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was malformed; nothing was read or written.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing write access, or the repository is inactive.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Stored history cannot be reconstructed (broken chain, bad patch,
    /// malformed row). Never repaired automatically.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("stale snapshot: {0}")]
    StaleSnapshot(String),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("git error: {0}")]
    Git(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn stale_snapshot(msg: impl Into<String>) -> Self {
        Self::StaleSnapshot(msg.into())
    }

    pub fn key_exists(key: impl Into<String>) -> Self {
        Self::KeyExists(key.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn invalid_branch_name(name: impl Into<String>) -> Self {
        Self::InvalidBranchName(name.into())
    }

    pub fn git(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Git(Box::new(err))
    }

    pub fn git_msg(msg: impl Into<String>) -> Self {
        let msg: String = msg.into();
        Self::Git(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }

    /// `true` when rerunning the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleSnapshot(_))
    }
}
