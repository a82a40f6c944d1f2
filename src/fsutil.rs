//! Filesystem helpers: recursive copy, move-into-place, removal with retries.

use std::io;
use std::path::Path;
use std::time::Duration;

/// Removal attempts before giving up on a locked directory.
pub const REMOVE_ATTEMPTS: u32 = 5;

/// Delay before the second attempt; grows linearly with each attempt.
pub const REMOVE_BACKOFF: Duration = Duration::from_millis(200);

pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if ty.is_dir() {
            copy_dir_all(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

/// Move `src` to `dst` (which must not exist). Renames when possible, copies across filesystems.
pub fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(src = %src.display(), dst = %dst.display(), error = %e, "Rename failed, copying instead");
            copy_dir_all(src, dst)?;
            std::fs::remove_dir_all(src)
        }
    }
}

/// Errors that usually mean another process still holds a file open.
pub fn is_lock_error(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    ) {
        return true;
    }
    // EBUSY / ENOTEMPTY (Linux, macOS), ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION (Windows)
    let busy: &[i32] = if cfg!(windows) { &[32, 33] } else { &[16, 39, 66] };
    e.raw_os_error().is_some_and(|code| busy.contains(&code))
}

/// Remove `dir` recursively, retrying lock-class failures with linear backoff.
///
/// A missing directory counts as removed. Returns the last error once attempts run out.
pub async fn remove_dir_with_retry(dir: &Path, attempts: u32, backoff: Duration) -> io::Result<()> {
    let mut attempt = 1;
    loop {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) if is_lock_error(&e) && attempt < attempts => {
                tracing::debug!(dir = %dir.display(), attempt, error = %e, "Directory locked, retrying removal");
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn move_dir_relocates_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.txt"), "hi").unwrap();

        let dst = temp.path().join("deeper/dst");
        move_dir(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read_to_string(dst.join("nested/file.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn remove_missing_dir_is_ok() {
        let temp = TempDir::new().unwrap();
        remove_dir_with_retry(&temp.path().join("nope"), 3, Duration::from_millis(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn remove_existing_dir() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("pkg");
        fs::create_dir_all(dir.join("a/b")).unwrap();
        fs::write(dir.join("a/b/c.js"), "").unwrap();

        remove_dir_with_retry(&dir, 3, Duration::from_millis(1)).await.unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn lock_errors_classified() {
        assert!(is_lock_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_lock_error(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
