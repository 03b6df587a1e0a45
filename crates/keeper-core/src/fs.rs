//! Filesystem utilities for key material on disk.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{KeeperError, Result};

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Atomically rename a file, with fallback for platforms where rename fails if target exists.
///
/// On some platforms (notably Windows), `fs::rename` fails if the destination already exists.
/// In that case the destination is removed and the rename retried; if that
/// fails too, the temp file is cleaned up.
pub fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            let _ = fs::remove_file(temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Write `data` to `path` readable by the owner only (0600 on Unix).
///
/// The file is written to a sibling temp file, synced, restricted and then
/// moved into place, so a crash never leaves a partial keyfile behind.
/// Missing parent directories are created.
///
/// Without `overwrite` the destination is claimed with a hard link, which the
/// OS refuses atomically if the name is taken; two concurrent writers can
/// never both succeed.
///
/// # Errors
///
/// Returns `KeeperError::AlreadyExists` if `path` exists and `overwrite` is false.
pub fn write_private(path: &Path, data: &[u8], overwrite: bool) -> Result<()> {
    if !overwrite && path.exists() {
        return Err(already_exists(path));
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| KeeperError::InvalidInput(format!("Invalid path: {}", path.display())))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| KeeperError::Storage(format!("System time error: {}", e)))?
        .as_nanos();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let temp_path = parent.join(format!(
        ".{}.{}.{}.{}.tmp",
        filename,
        std::process::id(),
        nanos,
        seq
    ));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;
    let written = file
        .write_all(data)
        .and_then(|_| file.sync_all())
        .and_then(|_| set_private_permissions(&temp_path));
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    if overwrite {
        rename_with_fallback(&temp_path, path)?;
        return Ok(());
    }

    let claimed = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);
    match claimed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(already_exists(path)),
        Err(e) => Err(e.into()),
    }
}

fn already_exists(path: &Path) -> KeeperError {
    KeeperError::AlreadyExists(format!("File already exists: {}", path.display()))
}

fn set_private_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
