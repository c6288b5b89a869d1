//! File and folder naming conventions.
//!
//! Everything written to disk is named from the recipient's local part and a
//! second-resolution local timestamp:
//!
//! | Item | Pattern |
//! |------|---------|
//! | captured photo | `{local}_{sequence}.{ext}` |
//! | session archive | `photos_{local}_{timestamp}.zip` |
//! | batch folder | `unsent_{local}_{timestamp}` |
//!
//! These names are part of the on-disk format read back by the replay engine
//! and must stay stable.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::types::Recipient;

/// Prefix shared by every batch folder.
pub const BATCH_FOLDER_PREFIX: &str = "unsent_";

/// Subfolder of the archive root that receives replayed batches.
pub const SENT_FOLDER_NAME: &str = "_sent";

/// Name of the metadata sidecar inside a batch folder.
pub const METADATA_FILE_NAME: &str = "SEND_TO.txt";

/// Extension of session archives.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Format used for timestamps in names and metadata.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Current local time formatted for names.
#[must_use]
pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Extension a captured photo keeps, exactly as the booth wrote it.
/// Files without one get `jpg`.
#[must_use]
pub fn capture_extension(source: &Path) -> String {
    source
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map_or_else(|| "jpg".to_string(), str::to_string)
}

/// Name for the `sequence`-th photo of a session.
#[must_use]
pub fn capture_file_name(recipient: &Recipient, sequence: u32, source: &Path) -> String {
    format!(
        "{}_{sequence}.{}",
        recipient.local_part(),
        capture_extension(source)
    )
}

/// Name for a session archive.
#[must_use]
pub fn archive_file_name(recipient: &Recipient, timestamp: &str) -> String {
    format!(
        "photos_{}_{timestamp}.{ARCHIVE_EXTENSION}",
        recipient.local_part()
    )
}

/// Name for a batch folder.
#[must_use]
pub fn batch_folder_name(recipient: &Recipient, timestamp: &str) -> String {
    format!("{BATCH_FOLDER_PREFIX}{}_{timestamp}", recipient.local_part())
}

/// Returns `dir/name`, or the first free `dir/{stem}_{n}{.ext}` with `n >= 2`.
///
/// `ext` names the extension to keep at the end of the name (without the dot);
/// pass `None` for directories so dots inside a local part are left alone.
#[must_use]
pub fn unique_path(dir: &Path, name: &str, ext: Option<&str>) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = ext
        .and_then(|ext| name.strip_suffix(ext))
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(name);

    (2u32..)
        .map(|n| match ext {
            Some(ext) if stem != name => dir.join(format!("{stem}_{n}.{ext}")),
            _ => dir.join(format!("{stem}_{n}")),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn alice() -> Recipient {
        Recipient::parse("alice@x.com").unwrap()
    }

    #[test]
    fn capture_name_keeps_extension() {
        assert_eq!(
            capture_file_name(&alice(), 3, Path::new("/w/IMG_0001.JPG")),
            "alice_3.JPG"
        );
        assert_eq!(
            capture_file_name(&alice(), 1, Path::new("/w/shot.jpeg")),
            "alice_1.jpeg"
        );
        assert_eq!(capture_file_name(&alice(), 1, Path::new("/w/raw")), "alice_1.jpg");
    }

    #[test]
    fn archive_and_batch_names() {
        assert_eq!(
            archive_file_name(&alice(), "20261014_101500"),
            "photos_alice_20261014_101500.zip"
        );
        assert_eq!(
            batch_folder_name(&alice(), "20261014_101500"),
            "unsent_alice_20261014_101500"
        );
    }

    #[test]
    fn timestamp_has_second_resolution() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 15);
        assert_eq!(&ts[8..9], "_");
    }

    #[test]
    fn unique_path_appends_suffix_on_collision() {
        let dir = tempfile::tempdir().unwrap();
        let first = unique_path(dir.path(), "photos_a_1.zip", Some("zip"));
        assert_eq!(first, dir.path().join("photos_a_1.zip"));

        fs::write(&first, b"x").unwrap();
        let second = unique_path(dir.path(), "photos_a_1.zip", Some("zip"));
        assert_eq!(second, dir.path().join("photos_a_1_2.zip"));

        fs::create_dir(dir.path().join("unsent_j.doe_1")).unwrap();
        assert_eq!(
            unique_path(dir.path(), "unsent_j.doe_1", None),
            dir.path().join("unsent_j.doe_1_2")
        );
    }
}
