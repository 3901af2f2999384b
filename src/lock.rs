use std::fs::OpenOptions;
use std::path::Path;

use fs2::FileExt;

use crate::error::{Error, Result};

/// Acquire an exclusive advisory file lock on the store, execute `f`, then
/// release.
///
/// Locks `<gitdir>/uvcs.lock`. Serializes ledger ref updates across threads
/// and processes.
///
/// # Arguments
/// * `gitdir` - Path to the bare repository directory.
/// * `f` - Closure to execute while the lock is held.
///
/// # Errors
/// Returns an error if the lock file cannot be opened or locked.
pub fn with_store_lock<F, T>(gitdir: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let lock_path = gitdir.join("uvcs.lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| Error::io(&lock_path, e))?;

    FileExt::lock_exclusive(&file).map_err(|e| Error::io(&lock_path, e))?;
    let result = f();
    // Closing the file releases the lock even if this fails.
    let _ = FileExt::unlock(&file);
    result
}
