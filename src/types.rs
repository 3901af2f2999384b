use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// An already-authenticated acting user.
    UserId
);
id_type!(RepositoryId);
id_type!(BranchId);
id_type!(
    /// Commit ids grow monotonically, so they order commits by creation.
    CommitId
);
id_type!(
    /// File change ids grow monotonically; within one diff chain they order
    /// rows oldest to newest.
    ChangeId
);

// ---------------------------------------------------------------------------
// ChangeKind
// ---------------------------------------------------------------------------

/// How a commit touched a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "M")]
    Modified,
    #[serde(rename = "D")]
    Deleted,
}

impl ChangeKind {
    /// Single-letter code (`A`, `M`, `D`).
    pub fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// ContentChange / FileChange
// ---------------------------------------------------------------------------

/// The stored payload of one file change.
///
/// When `is_diff` is set, `content` is a serialized patch against the
/// predecessor row. Otherwise it is the full blob: text verbatim, binary
/// data base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChange {
    pub content: String,
    pub is_code: bool,
    pub is_binary: bool,
    pub is_diff: bool,
}

/// One commit's record for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub id: ChangeId,
    pub commit: CommitId,
    pub repository: RepositoryId,
    pub path: String,
    pub change_kind: ChangeKind,
    /// The row this one was computed against, if any.
    pub previous: Option<ChangeId>,
    pub content_change: ContentChange,
}

// ---------------------------------------------------------------------------
// Repository / Branch / Commit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub owner: UserId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub repository: RepositoryId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Append-only, oldest first.
    pub commit_ids: Vec<CommitId>,
    pub head: Option<CommitId>,
    pub active: bool,
}

/// An immutable commit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: CommitId,
    pub repository: RepositoryId,
    pub author: UserId,
    pub hash: String,
    pub message: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

/// Access a user holds on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
    Owner,
}

impl AccessLevel {
    /// Owner and explicit write grants are equivalent for committing.
    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::Owner)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Owner => "owner",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AccessLevel {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "owner" => Ok(Self::Owner),
            other => Err(crate::error::Error::validation(format!(
                "unknown access level: {}",
                other
            ))),
        }
    }
}

/// An explicit grant row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub repository: RepositoryId,
    pub user: UserId,
    pub level: AccessLevel,
    pub granted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

/// Last allocated id per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequences {
    pub repository: u64,
    pub branch: u64,
    pub commit: u64,
    pub change: u64,
}

// ---------------------------------------------------------------------------
// Signature / OpenOptions
// ---------------------------------------------------------------------------

/// Identity recorded on ledger commits.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pub email: String,
}

impl Default for Signature {
    fn default() -> Self {
        Self {
            name: "uvcs".into(),
            email: "uvcs@localhost".into(),
        }
    }
}

/// Default number of reruns for a conflicting commit request.
pub const DEFAULT_RETRIES: u32 = 5;

/// Options for opening or creating a `Store`.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Create the repository if it doesn't exist.
    pub create: bool,
    /// Ledger commit author name.
    pub author: Option<String>,
    /// Ledger commit author email.
    pub email: Option<String>,
    /// Reruns of a commit request after a conflicting concurrent write.
    /// Defaults to [`DEFAULT_RETRIES`].
    pub retries: Option<u32>,
}
