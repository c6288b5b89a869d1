//! Bundles a session's photos into a single zip archive.
//!
//! The archive is written to a hidden `.partial` file in the output directory
//! and renamed to its final `photos_{local}_{timestamp}.zip` name only once
//! the zip directory has been written. Any failure removes the partial file,
//! so a file with the final name is always a complete archive.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::types::Recipient;
use crate::utils::fsops::temp_sibling;
use crate::utils::naming::{archive_file_name, unique_path, ARCHIVE_EXTENSION};

/// Errors raised while building a session archive.
#[derive(Error, Debug)]
pub enum PackagingError {
    /// Packaging was asked to build an archive with no photos in it.
    #[error("no files to package")]
    Empty,

    /// An input photo could not be opened or read.
    #[error("cannot read {}: {source}", .path.display())]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output location could not be written.
    #[error("cannot write archive {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The zip encoder failed.
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
}

/// Writes `files` into a new archive in `output_dir` and returns its path.
///
/// Entries are stored under their base filenames, in the order given.
///
/// # Errors
///
/// Returns [`PackagingError`] if any input is unreadable or the output
/// directory is not writable. No archive is left behind in that case.
pub fn package(
    files: &[PathBuf],
    recipient: &Recipient,
    output_dir: &Path,
    timestamp: &str,
) -> Result<PathBuf, PackagingError> {
    if files.is_empty() {
        return Err(PackagingError::Empty);
    }

    fs::create_dir_all(output_dir).map_err(|source| PackagingError::Output {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let target = unique_path(
        output_dir,
        &archive_file_name(recipient, timestamp),
        Some(ARCHIVE_EXTENSION),
    );
    let partial = temp_sibling(&target, &format!("{}.partial", Uuid::new_v4().simple()));

    let result = write_archive(files, &partial).and_then(|()| {
        fs::rename(&partial, &target).map_err(|source| PackagingError::Output {
            path: target.clone(),
            source,
        })
    });

    if let Err(err) = result {
        let _ = fs::remove_file(&partial);
        return Err(err);
    }

    info!(
        recipient = %recipient,
        photos = files.len(),
        archive = %target.display(),
        "Packaged session"
    );
    Ok(target)
}

fn write_archive(files: &[PathBuf], partial: &Path) -> Result<(), PackagingError> {
    let out = File::create(partial).map_err(|source| PackagingError::Output {
        path: partial.to_path_buf(),
        source,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in files {
        let unreadable = |source| PackagingError::UnreadableInput {
            path: path.clone(),
            source,
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| unreadable(io::Error::from(io::ErrorKind::InvalidInput)))?;
        let mut input = File::open(path).map_err(unreadable)?;

        zip.start_file(name.as_str(), options)?;
        io::copy(&mut input, &mut zip).map_err(unreadable)?;
        debug!(entry = %name, "Added archive entry");
    }

    let writer = zip.finish()?;
    let file = writer
        .into_inner()
        .map_err(|err| PackagingError::Output {
            path: partial.to_path_buf(),
            source: err.into_error(),
        })?;
    file.sync_all().map_err(|source| PackagingError::Output {
        path: partial.to_path_buf(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn alice() -> Recipient {
        Recipient::parse("alice@x.com").unwrap()
    }

    fn photos(dir: &Path, n: u32) -> Vec<PathBuf> {
        (1..=n)
            .map(|i| {
                let p = dir.join(format!("alice_{i}.jpg"));
                fs::write(&p, format!("photo {i}")).unwrap();
                p
            })
            .collect()
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn archive_holds_every_file_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let watch = dir.path().join("watch");
        fs::create_dir(&watch).unwrap();
        let files = photos(&watch, 3);

        let archive = package(&files, &alice(), &dir.path().join("zips"), "20261014_101500")
            .unwrap();

        assert_eq!(
            archive,
            dir.path().join("zips").join("photos_alice_20261014_101500.zip")
        );
        assert_eq!(
            entry_names(&archive),
            vec!["alice_1.jpg", "alice_2.jpg", "alice_3.jpg"]
        );

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut body = String::new();
        zip.by_name("alice_2.jpg")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "photo 2");
    }

    #[test]
    fn same_second_archives_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let files = photos(dir.path(), 1);
        let out = dir.path().join("zips");

        let first = package(&files, &alice(), &out, "20261014_101500").unwrap();
        let second = package(&files, &alice(), &out, "20261014_101500").unwrap();

        assert_ne!(first, second);
        assert_eq!(second, out.join("photos_alice_20261014_101500_2.zip"));
    }

    #[test]
    fn unreadable_input_leaves_no_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = photos(dir.path(), 2);
        files.push(dir.path().join("alice_3.jpg"));
        let out = dir.path().join("zips");

        let err = package(&files, &alice(), &out, "20261014_101500").unwrap_err();

        assert!(matches!(err, PackagingError::UnreadableInput { .. }));
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }

    #[test]
    fn empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            package(&[], &alice(), dir.path(), "20261014_101500"),
            Err(PackagingError::Empty)
        ));
    }
}
