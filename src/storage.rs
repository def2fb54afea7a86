//! Write-then-rename output files.

use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::pipeline::{Completion, Sink};

/// An output file that only appears at its target path once it is complete.
///
/// Data is written to a temporary file with a random name in the target's
/// directory. Closing with [`Completion::Finished`]:
/// 1. Syncs the temporary file to disk
/// 2. Atomically replaces the target with it
/// 3. Syncs the parent directory so the rename is persisted
///
/// Closing with [`Completion::Aborted`], or dropping the value without
/// closing it, deletes the temporary file and leaves the target untouched.
pub struct StagedFile {
    target: PathBuf,
    tmp_path: PathBuf,
    file: Option<File>,
}

impl StagedFile {
    /// Creates the temporary file for `target`.
    ///
    /// Creates parent directories if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or temporary file cannot be created.
    pub fn create(target: &Path) -> io::Result<Self> {
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = random_tmp_path(target)?;

        // securely create temp file (fail if exists)
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        debug!(tmp = %tmp_path.display(), "staging output");
        Ok(Self {
            target: target.to_path_buf(),
            tmp_path,
            file: Some(file),
        })
    }

    /// Returns the path the data will be published to.
    pub fn target(&self) -> &Path {
        &self.target
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("staged file already closed"))
    }

    fn publish(&mut self) -> io::Result<()> {
        self.publish_with(sync_parent)
    }

    /// Once the rename succeeded the output is in place, so a failed
    /// directory sync is only logged.
    fn publish_with(&mut self, sync_dir: impl FnOnce(&Path) -> io::Result<()>) -> io::Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| io::Error::other("staged file already closed"))?;
        file.flush()?;
        file.sync_all()?; //fsync file
        drop(file);

        //atomic replace
        atomic_replace(&self.tmp_path, &self.target)?;

        // fsync directory
        if let Err(e) = sync_dir(&self.target) {
            warn!(path = %self.target.display(), error = %e, "directory sync failed after publish");
        }

        debug!(path = %self.target.display(), "published output");
        Ok(())
    }

    fn discard(&mut self) {
        self.file = None;
        if fs::remove_file(&self.tmp_path).is_ok() {
            debug!(tmp = %self.tmp_path.display(), "discarded partial output");
        }
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Sink for StagedFile {
    fn close(mut self, completion: Completion) -> io::Result<()> {
        match completion {
            Completion::Finished => {
                let published = self.publish();
                if published.is_err() {
                    self.discard();
                }
                published
            }
            Completion::Aborted => {
                self.discard();
                Ok(())
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.file.is_some() {
            self.discard();
        }
    }
}

/// Generates a unique temporary file path in the same directory.
///
/// Uses cryptographically secure random bytes to avoid name collisions.
/// Format: `filename.tmp.<randomhex>`
fn random_tmp_path(target: &Path) -> io::Result<PathBuf> {
    let mut buf = [0u8; 8]; // 64 bit entropy
    fill(&mut buf).map_err(|e| io::Error::other(format!("OS random generator unavailable: {e}")))?;

    let file_name = target
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name"))?
        .to_string_lossy();

    let tmp_name = format!("{}.tmp.{}", file_name, hex::encode(buf));

    Ok(target.with_file_name(tmp_name))
}

#[cfg(not(target_os = "windows"))]
fn sync_parent(target: &Path) -> io::Result<()> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

/// `REPLACEFILE_WRITE_THROUGH` already persists the rename on Windows.
#[cfg(target_os = "windows")]
fn sync_parent(_target: &Path) -> io::Result<()> {
    Ok(())
}

/// Atomically replaces the target file with the temporary file.
///
/// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
/// when the target exists, and `MoveFileExW` otherwise.
#[cfg(target_os = "windows")]
fn atomic_replace(tmp_path: &Path, target: &Path) -> io::Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{
        MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW, REPLACEFILE_WRITE_THROUGH,
        ReplaceFileW,
    };

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        if target.exists() {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        } else {
            MoveFileExW(
                tmp_w.as_ptr(),
                target_w.as_ptr(),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        }
    };

    if result == 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Atomically replaces the target file with the temporary file.
///
/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(tmp_path: &Path, target: &Path) -> io::Result<()> {
    fs::rename(tmp_path, target)
}
