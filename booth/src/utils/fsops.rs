//! Small filesystem primitives shared by the archiver and the replay engine.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::debug;

/// Moves `from` to `to`, copying and removing when a rename is not possible
/// (for example across filesystems).
///
/// Directories are only ever renamed; a failed directory rename is returned.
///
/// # Errors
///
/// Returns the rename error, or the copy/remove error of the fallback path.
pub fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err)
            if from.is_file()
                && matches!(
                    err.kind(),
                    ErrorKind::CrossesDevices | ErrorKind::PermissionDenied
                ) =>
        {
            debug!(
                from = %from.display(),
                to = %to.display(),
                error = %err,
                "Rename failed, copying instead"
            );
            fs::copy(from, to)?;
            if let Err(remove_err) = fs::remove_file(from) {
                // Keep exactly one copy.
                let _ = fs::remove_file(to);
                return Err(remove_err);
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Writes `contents` to `path` by way of a sibling temp file, so readers only
/// ever see the complete file.
///
/// # Errors
///
/// Returns the write or rename error; the temp file is removed on failure.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = temp_sibling(path, "tmp");
    if let Err(err) = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

/// Hidden `.{name}.{tag}` path next to `path`.
#[must_use]
pub fn temp_sibling(path: &Path, tag: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{tag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_path_relocates_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.zip");
        let to = dir.path().join("sub").join("a.zip");
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(&from, b"zip").unwrap();

        move_path(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"zip");
    }

    #[test]
    fn write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SEND_TO.txt");

        write_atomic(&path, b"RECIPIENT EMAIL: a@b.c\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "RECIPIENT EMAIL: a@b.c\n");
        assert!(!temp_sibling(&path, "tmp").exists());
    }

    #[test]
    fn write_atomic_into_missing_dir_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("SEND_TO.txt");
        assert!(write_atomic(&path, b"x").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn temp_sibling_is_hidden() {
        assert_eq!(
            temp_sibling(Path::new("/z/photos_a.zip"), "partial"),
            PathBuf::from("/z/.photos_a.zip.partial")
        );
    }
}
