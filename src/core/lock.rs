use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::RecapError;

/// Exclusive advisory lock held for the duration of one run.
///
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Lock file guarding a checkpoint file: `<checkpoint>.lock` next to it.
    #[must_use]
    pub fn path_for(checkpoint_file: &Path) -> PathBuf {
        let mut name = checkpoint_file
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".lock");
        checkpoint_file.with_file_name(name)
    }

    /// Returns `Ok(None)` when another process already holds the lock.
    ///
    /// # Errors
    ///
    /// Returns `RecapError::LockError` when the lock file cannot be created or locked.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, RecapError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                RecapError::LockError(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                RecapError::LockError(format!("failed to open {}: {e}", path.display()))
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(None),
            Err(err) => {
                // fs2 maps EWOULDBLOCK to its own error kind on some platforms
                if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                    return Ok(None);
                }
                return Err(RecapError::LockError(format!(
                    "failed to lock {}: {err}",
                    path.display()
                )));
            }
        }

        file.set_len(0)
            .and_then(|()| writeln!(&mut file, "{}", std::process::id()))
            .map_err(|e| {
                RecapError::LockError(format!("failed to write {}: {e}", path.display()))
            })?;

        debug!("Acquired run lock {}", path.display());
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("last_run.json.lock");

        let first = RunLock::try_acquire(&path).unwrap();
        assert!(first.is_some());
        assert!(RunLock::try_acquire(&path).unwrap().is_none());

        drop(first);
        assert!(RunLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn lock_path_sits_next_to_checkpoint() {
        let path = RunLock::path_for(Path::new("state/last_run.json"));
        assert_eq!(path, PathBuf::from("state/last_run.json.lock"));
    }
}
