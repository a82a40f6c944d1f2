//! Zip extraction for package import.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// macOS resource-fork folder some archivers add next to the real content.
const MACOS_METADATA_DIR: &str = "__MACOSX";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to open archive {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("Invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry escapes destination: {0}")]
    UnsafeEntry(String),

    #[error("Failed to extract {}: {source}", path.display())]
    Extract { path: PathBuf, source: io::Error },

    #[error("Archive is empty")]
    Empty,
}

/// Extract every entry of `archive_path` below `dest_dir`.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive_path).map_err(|e| ArchiveError::Open {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let mut archive = zip::ZipArchive::new(file)?;
    if archive.is_empty() {
        return Err(ArchiveError::Empty);
    }

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let raw = entry.name().replace('\\', "/");
        let rel = sanitize_entry_path(&raw)?;
        let out = dest_dir.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| extract_error(&out, e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| extract_error(parent, e))?;
        }
        let mut out_file = File::create(&out).map_err(|e| extract_error(&out, e))?;
        io::copy(&mut entry, &mut out_file).map_err(|e| extract_error(&out, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode().filter(|m| m & 0o777 != 0) {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out, fs::Permissions::from_mode(mode & 0o777))
                .map_err(|e| extract_error(&out, e))?;
        }
    }

    tracing::debug!(archive = %archive_path.display(), entries = archive.len(), "Archive extracted");
    Ok(())
}

/// The directory holding the package content: descends into a single wrapping directory.
pub fn package_root(extract_dir: &Path) -> io::Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(extract_dir)? {
        let entry = entry?;
        if entry.file_name() == MACOS_METADATA_DIR {
            continue;
        }
        entries.push(entry);
    }

    if let [only] = entries.as_slice() {
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(extract_dir.to_path_buf())
}

fn sanitize_entry_path(raw: &str) -> Result<PathBuf, ArchiveError> {
    let mut cleaned = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::ParentDir => {
                return Err(ArchiveError::UnsafeEntry(raw.to_string()));
            }
            Component::CurDir => {}
            Component::Normal(part) => cleaned.push(part),
        }
    }
    if cleaned.as_os_str().is_empty() {
        return Err(ArchiveError::UnsafeEntry(raw.to_string()));
    }
    Ok(cleaned)
}

fn extract_error(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Extract {
        path: path.to_path_buf(),
        source,
    }
}
