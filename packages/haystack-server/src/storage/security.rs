//! The security gate (§4.G): path and permission validation the
//! persistent store runs before it opens the data directory or either
//! of its files.
//!
//! These are invariants of the on-disk layer, not configuration -- there
//! is no flag to turn them off.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

const DIR_MODE: u32 = 0o750;
const FILE_MODE: u32 = 0o600;

fn violation(message: impl Into<String>) -> StoreError {
    StoreError::SecurityViolation(message.into())
}

/// Rejects empty paths and any path containing a `..` component, then
/// canonicalizes.
///
/// # Errors
///
/// Returns [`StoreError::SecurityViolation`] if `path` is empty,
/// contains `..`, or cannot be canonicalized.
pub fn canonicalize_safe(path: &Path) -> Result<PathBuf, StoreError> {
    if path.as_os_str().is_empty() {
        return Err(violation("empty path"));
    }
    if path.components().any(|c| c == std::path::Component::ParentDir) {
        return Err(violation(format!("path traversal in {}", path.display())));
    }
    // The parent may not exist yet (we're about to create it); canonicalize
    // what does exist and rejoin the rest.
    let mut existing = path;
    let mut missing_tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(base) => {
                let mut result = base;
                for component in missing_tail.into_iter().rev() {
                    result.push(component);
                }
                return Ok(result);
            }
            Err(_) if existing.parent().is_some() => {
                if let Some(name) = existing.file_name() {
                    missing_tail.push(name.to_owned());
                }
                existing = existing.parent().unwrap();
            }
            Err(err) => return Err(StoreError::IoFailure(err)),
        }
    }
}

/// Ensures `dir` exists as a directory owned by the current user, mode
/// `0o750` (created if absent), and not world-writable.
///
/// # Errors
///
/// Returns [`StoreError::SecurityViolation`] if `dir` exists but is not a
/// directory, is not owned by the current user, or is world-writable.
pub fn ensure_data_directory(dir: &Path) -> Result<(), StoreError> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(DIR_MODE))?;
    }

    let metadata = fs::metadata(dir)?;
    if !metadata.is_dir() {
        return Err(violation(format!("{} is not a directory", dir.display())));
    }

    let current_uid = current_uid();
    if metadata.uid() != current_uid {
        return Err(violation(format!(
            "{} is not owned by the current user",
            dir.display()
        )));
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o002 != 0 {
        return Err(violation(format!(
            "{} is world-writable (mode {mode:o})",
            dir.display()
        )));
    }

    Ok(())
}

/// Ensures a data or index file exists with mode `0o600`, owned by the
/// current user. Rejects filenames containing a path separator.
///
/// Creates the file (empty) if it does not yet exist. If validation
/// fails after creation, the file is unlinked and the error returned --
/// a store never leaves a half-trusted file behind.
///
/// # Errors
///
/// Returns [`StoreError::SecurityViolation`] on any ownership,
/// permission, or filename violation.
pub fn ensure_secure_file(path: &Path) -> Result<(), StoreError> {
    // `Path::file_name` splits on `MAIN_SEPARATOR` itself, so a returned
    // component can never contain one; this check is defense-in-depth
    // against a future caller that builds `path` by raw string
    // concatenation instead of `Path::join`.
    if let Some(name) = path.file_name() {
        if name.to_string_lossy().contains(std::path::MAIN_SEPARATOR) {
            return Err(violation("filename contains a path separator"));
        }
    } else {
        return Err(violation("path has no filename component"));
    }

    let created = !path.exists();
    if created {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        file.set_permissions(fs::Permissions::from_mode(FILE_MODE))?;
        drop(file);
    }

    match validate_file_permissions(path) {
        Ok(()) => Ok(()),
        Err(err) => {
            if created {
                let _ = fs::remove_file(path);
            }
            Err(err)
        }
    }
}

fn validate_file_permissions(path: &Path) -> Result<(), StoreError> {
    let metadata = fs::metadata(path)?;
    if metadata.uid() != current_uid() {
        return Err(violation(format!(
            "{} is not owned by the current user",
            path.display()
        )));
    }
    let mode = metadata.permissions().mode() & 0o777;
    if mode != FILE_MODE {
        return Err(violation(format!(
            "{} has mode {mode:o}, expected {FILE_MODE:o}",
            path.display()
        )));
    }
    Ok(())
}

fn current_uid() -> u32 {
    // SAFETY: getuid() has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_empty_path() {
        let err = canonicalize_safe(Path::new("")).unwrap_err();
        assert!(matches!(err, StoreError::SecurityViolation(_)));
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        let err = canonicalize_safe(Path::new("foo/../bar")).unwrap_err();
        assert!(matches!(err, StoreError::SecurityViolation(_)));
    }

    #[test]
    fn creates_directory_with_correct_mode() {
        let base = tempdir().unwrap();
        let target = base.path().join("data");
        ensure_data_directory(&target).unwrap();

        let metadata = fs::metadata(&target).unwrap();
        assert!(metadata.is_dir());
        assert_eq!(metadata.permissions().mode() & 0o777, DIR_MODE);
    }

    #[test]
    fn rejects_world_writable_directory() {
        let base = tempdir().unwrap();
        let target = base.path().join("data");
        fs::create_dir(&target).unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o777)).unwrap();

        let err = ensure_data_directory(&target).unwrap_err();
        assert!(matches!(err, StoreError::SecurityViolation(_)));
    }

    #[test]
    fn creates_file_with_correct_mode() {
        let base = tempdir().unwrap();
        let target = base.path().join("haystack.data");
        ensure_secure_file(&target).unwrap();

        let metadata = fs::metadata(&target).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, FILE_MODE);
    }

    #[test]
    fn rejects_insecure_existing_file() {
        let base = tempdir().unwrap();
        let target = base.path().join("haystack.data");
        fs::write(&target, b"").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();

        let err = ensure_secure_file(&target).unwrap_err();
        assert!(matches!(err, StoreError::SecurityViolation(_)));
        // Pre-existing file with wrong mode is left untouched, not unlinked.
        assert!(target.exists());
    }

    #[test]
    fn rejects_path_with_no_filename_component() {
        let err = ensure_secure_file(Path::new("/")).unwrap_err();
        assert!(matches!(err, StoreError::SecurityViolation(_)));
    }
}
