//! Write-to-temp-then-rename publication.
//!
//! Files are first written under a hidden, uniquely named temp path in the
//! destination directory, flushed to disk, and only then renamed onto their
//! final name. `rename(2)` within one filesystem is atomic, so a reader looking
//! at the final path sees either nothing or the complete file.
//!
//! Publication is split in two steps so callers (and tests) can observe the
//! state in between:
//!
//! ```text
//! stage(target, bytes) ──► StagedFile ──commit()──► target exists
//!                               │
//!                               └──drop()──► temp removed, target untouched
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StorageError;

/// Per-process counter that keeps temp names unique between concurrent stages.
static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Build a temp path next to `target`: `.{name}.tmp-{pid}-{seq}`.
fn temp_path_for(target: &Path) -> Result<PathBuf, StorageError> {
    let parent = target.parent().ok_or_else(|| StorageError::Io {
        path: target.display().to_string(),
        message: "target has no parent directory".to_string(),
    })?;
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("file");
    let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    Ok(parent.join(format!(".{}.tmp-{}-{}", name, std::process::id(), seq)))
}

/// Bytes fully written to a temp file, not yet visible under the final name.
///
/// Dropping a `StagedFile` without calling [`commit`](Self::commit) removes
/// the temp file. That cleanup runs in `Drop`, so it is a blocking
/// `std::fs::remove_file` on whatever thread drops the value; it only happens
/// on cancellation. Error paths inside this module call
/// [`discard`](Self::discard) instead, which removes the file asynchronously.
#[derive(Debug)]
pub struct StagedFile {
    temp: PathBuf,
    target: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Path of the temp file holding the staged bytes.
    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Path the file will have once committed.
    pub fn target_path(&self) -> &Path {
        &self.target
    }

    /// Atomically move the staged bytes to the final path.
    ///
    /// If the rename fails the temp file is removed and the target is left
    /// as it was.
    pub async fn commit(mut self) -> Result<(), StorageError> {
        if let Err(e) = tokio::fs::rename(&self.temp, &self.target).await {
            let err = StorageError::from_io(&self.target, e);
            self.discard().await;
            return Err(err);
        }
        self.committed = true;

        // Persist the directory entry; failure here does not undo the rename.
        if let Some(parent) = self.target.parent() {
            if let Ok(dir) = tokio::fs::File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }
        Ok(())
    }

    /// Remove the temp file without blocking the executor.
    pub async fn discard(mut self) {
        self.committed = true;
        if let Err(e) = tokio::fs::remove_file(&self.temp).await {
            debug!(path = %self.temp.display(), "Could not remove temp file: {}", e);
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.temp) {
                debug!(path = %self.temp.display(), "Could not remove temp file: {}", e);
            }
        }
    }
}

/// Write `data` to a temp file beside `target` and flush it to disk.
///
/// The directory containing `target` must already exist. On failure the
/// temp file is removed and `target` is never touched.
pub async fn stage(target: &Path, data: &[u8]) -> Result<StagedFile, StorageError> {
    let temp = temp_path_for(target)?;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp)
        .await
        .map_err(|e| StorageError::from_io(&temp, e))?;

    // From here on the guard owns cleanup of the temp file.
    let staged = StagedFile {
        temp,
        target: target.to_path_buf(),
        committed: false,
    };

    let written = match file.write_all(data).await {
        Ok(()) => file.sync_all().await,
        Err(e) => Err(e),
    };
    drop(file);

    match written {
        Ok(()) => Ok(staged),
        Err(e) => {
            let err = StorageError::from_io(&staged.temp, e);
            staged.discard().await;
            Err(err)
        }
    }
}

/// Stage and commit `data` at `target` in one call.
pub async fn publish(target: &Path, data: &[u8]) -> Result<(), StorageError> {
    stage(target, data).await?.commit().await
}
