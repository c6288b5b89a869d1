//! Durable fallback for sessions that could not be delivered.
//!
//! [`archive_batch`] turns an undeliverable session archive into a
//! self-describing batch folder (see [`batch`](crate::batch)). The steps are
//! ordered so that a discoverable batch is always complete:
//!
//! 1. create the uniquely named folder,
//! 2. move the archive into it,
//! 3. write the sidecar through a temp file and rename it into place.
//!
//! If any step fails, the archive is moved back to where it was and the
//! folder is removed. The replay engine only picks up folders with a complete
//! sidecar, which is the last thing written.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::batch::{Batch, BatchMetadata};
use crate::types::{DeliveryMethod, Recipient};
use crate::utils::fsops::{move_path, write_atomic};
use crate::utils::naming::{batch_folder_name, unique_path, METADATA_FILE_NAME};

/// Errors raised while writing a batch folder.
#[derive(Error, Debug)]
pub enum ArchivingError {
    /// The archive to preserve does not exist.
    #[error("archive {} not found", .0.display())]
    SourceMissing(PathBuf),

    /// The archive root or batch folder could not be created.
    #[error("cannot create batch folder {}: {source}", .path.display())]
    CreateFolder {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The archive could not be moved into the batch folder.
    #[error("cannot move {} into batch folder: {source}", .path.display())]
    MoveArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The metadata sidecar could not be written.
    #[error("cannot write {}: {source}", .path.display())]
    WriteMetadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Moves `archive_path` into a new batch folder under `archive_root` and
/// records its metadata.
///
/// # Errors
///
/// Returns [`ArchivingError`] if the batch could not be fully written. No
/// batch folder is left behind in that case, and the archive is back at
/// `archive_path` whenever it could be moved back.
pub fn archive_batch(
    archive_root: &Path,
    archive_path: &Path,
    recipient: &Recipient,
    photo_count: usize,
    method: DeliveryMethod,
    timestamp: &str,
) -> Result<Batch, ArchivingError> {
    let archive_file = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .filter(|_| archive_path.is_file())
        .ok_or_else(|| ArchivingError::SourceMissing(archive_path.to_path_buf()))?;

    fs::create_dir_all(archive_root).map_err(|source| ArchivingError::CreateFolder {
        path: archive_root.to_path_buf(),
        source,
    })?;

    let folder = unique_path(archive_root, &batch_folder_name(recipient, timestamp), None);
    fs::create_dir(&folder).map_err(|source| ArchivingError::CreateFolder {
        path: folder.clone(),
        source,
    })?;

    let metadata = BatchMetadata {
        recipient: recipient.clone(),
        timestamp: Some(timestamp.to_string()),
        archive_file,
        photo_count: Some(photo_count),
        method: Some(method.label().to_string()),
        instructions: BatchMetadata::recovery_instructions(method.label(), recipient),
    };

    match fill_folder(&folder, archive_path, &metadata) {
        Ok(batch) => {
            info!(
                recipient = %recipient,
                photos = photo_count,
                batch = %batch.dir.display(),
                "Archived undelivered session"
            );
            Ok(batch)
        }
        Err(err) => {
            error!(
                recipient = %recipient,
                batch = %folder.display(),
                error = %err,
                "Archiving failed, rolling back batch folder"
            );
            roll_back(&folder, archive_path, &metadata.archive_file);
            Err(err)
        }
    }
}

fn fill_folder(
    folder: &Path,
    archive_path: &Path,
    metadata: &BatchMetadata,
) -> Result<Batch, ArchivingError> {
    let moved = folder.join(&metadata.archive_file);
    move_path(archive_path, &moved).map_err(|source| ArchivingError::MoveArchive {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let sidecar = folder.join(METADATA_FILE_NAME);
    write_atomic(&sidecar, metadata.render().as_bytes()).map_err(|source| {
        ArchivingError::WriteMetadata {
            path: sidecar.clone(),
            source,
        }
    })?;

    let name = folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Batch {
        dir: folder.to_path_buf(),
        name,
        metadata: metadata.clone(),
    })
}

fn roll_back(folder: &Path, archive_path: &Path, archive_file: &str) {
    let moved = folder.join(archive_file);
    if moved.exists() {
        if let Err(err) = move_path(&moved, archive_path) {
            // Leave the folder in place rather than delete the only copy.
            warn!(
                archive = %moved.display(),
                error = %err,
                "Could not move archive back out of batch folder"
            );
            return;
        }
    }
    if let Err(err) = fs::remove_dir_all(folder) {
        warn!(batch = %folder.display(), error = %err, "Could not remove batch folder");
    }
}
