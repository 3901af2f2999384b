use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify;
use crate::error::Result;
use crate::history;
use crate::snapshot::Reader;
use crate::types::{ChangeId, ChangeKind, CommitId, RepositoryId};

/// The current content of one live path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedFile {
    /// Text verbatim, binary data base64-encoded.
    pub content: String,
    pub is_code: bool,
    pub is_binary: bool,
    pub commit: CommitId,
    pub change: ChangeId,
}

impl MaterializedFile {
    /// Raw bytes of the file.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        classify::decode_content(self.content.clone(), self.is_binary)
    }
}

/// Latest content of every live path in `repo`, keyed by path.
///
/// Paths whose most recent change is a deletion are left out. Read-only.
pub fn snapshot<R: Reader>(
    reader: &R,
    repo: RepositoryId,
) -> Result<BTreeMap<String, MaterializedFile>> {
    let mut out = BTreeMap::new();
    for path in reader.chain_paths(repo)? {
        let rows = reader.chain(repo, &path)?;
        let Some(latest) = rows.last() else {
            continue;
        };
        if latest.change_kind == ChangeKind::Deleted {
            continue;
        }
        let content = history::reconstruct(&rows, rows.len() - 1)?;
        out.insert(
            path,
            MaterializedFile {
                content,
                is_code: latest.content_change.is_code,
                is_binary: latest.content_change.is_binary,
                commit: latest.commit,
                change: latest.id,
            },
        );
    }
    Ok(out)
}
