use std::collections::BTreeMap;
use std::path::Path;

use git2::build::TreeUpdateBuilder;
use git2::{ErrorCode, FileMode, ObjectType, Oid, Repository};

use crate::error::{Error, Result};

/// Write an empty tree and return its oid.
pub(crate) fn empty_tree(repo: &Repository) -> Result<Oid> {
    let builder = repo.treebuilder(None).map_err(Error::git)?;
    builder.write().map_err(Error::git)
}

/// Return the blob stored at `key`, or `None` if missing.
///
/// # Arguments
/// * `repo` - The git repository.
/// * `tree_oid` - Root tree to search from.
/// * `key` - Forward-slash path (e.g. `"commits/00000000000000000001.json"`).
pub(crate) fn read_blob(repo: &Repository, tree_oid: Oid, key: &str) -> Result<Option<Vec<u8>>> {
    let tree = repo.find_tree(tree_oid).map_err(Error::git)?;
    let entry = match tree.get_path(Path::new(key)) {
        Ok(entry) => entry,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(Error::git(e)),
    };
    if entry.kind() != Some(ObjectType::Blob) {
        return Ok(None);
    }
    let blob = repo.find_blob(entry.id()).map_err(Error::git)?;
    Ok(Some(blob.content().to_vec()))
}

/// Return the entry names directly under `dir`, in tree order.
///
/// A missing directory yields an empty list.
pub(crate) fn list_dir(repo: &Repository, tree_oid: Oid, dir: &str) -> Result<Vec<String>> {
    let root = repo.find_tree(tree_oid).map_err(Error::git)?;
    let subtree = match root.get_path(Path::new(dir)) {
        Ok(entry) if entry.kind() == Some(ObjectType::Tree) => {
            repo.find_tree(entry.id()).map_err(Error::git)?
        }
        Ok(_) => return Ok(vec![]),
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(vec![]),
        Err(e) => return Err(Error::git(e)),
    };

    let mut names = Vec::with_capacity(subtree.len());
    for entry in subtree.iter() {
        let name = entry
            .name()
            .ok_or_else(|| Error::integrity("ledger tree entry name is not UTF-8"))?;
        names.push(name.to_string());
    }
    Ok(names)
}

/// Build a new root tree from `base_tree` with `writes` applied.
///
/// `Some(data)` upserts a blob at the key; `None` removes it. Intermediate
/// trees are created and pruned as needed.
pub(crate) fn rebuild_tree(
    repo: &Repository,
    base_tree: Oid,
    writes: &BTreeMap<String, Option<Vec<u8>>>,
) -> Result<Oid> {
    let baseline = repo.find_tree(base_tree).map_err(Error::git)?;
    let mut update = TreeUpdateBuilder::new();
    for (key, data) in writes {
        match data {
            Some(bytes) => {
                let oid = repo.blob(bytes).map_err(Error::git)?;
                update.upsert(key.as_str(), oid, FileMode::Blob);
            }
            None => {
                update.remove(key.as_str());
            }
        }
    }
    update.create_updated(repo, &baseline).map_err(Error::git)
}
