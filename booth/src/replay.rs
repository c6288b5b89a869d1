//! Resending archived batches.
//!
//! The replay engine works purely from the archive root on disk: it finds
//! `unsent_*` folders with a complete sidecar, resends each archive through a
//! [`DeliveryGateway`], and moves delivered folders into `_sent/`. Batches are
//! handled one after another and independently, so one failure never stops
//! the rest. Because delivered folders leave the root, running replay again
//! over the same root skips them.
//!
//! Replay must not run against an archive root that a live session is writing
//! to at the same time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batch::Batch;
use crate::delivery::{attempt_delivery, DeliveryGateway, MessageTemplate};
use crate::error::{BoothError, Result};
use crate::types::DeliveryOutcome;
use crate::utils::fsops::move_path;
use crate::utils::naming::{unique_path, BATCH_FOLDER_PREFIX, SENT_FOLDER_NAME};

/// Lists the replayable batches directly under `archive_root`, sorted by
/// folder name.
///
/// Folders without the batch prefix or without a complete sidecar are
/// skipped.
///
/// # Errors
///
/// [`BoothError::ArchiveRootNotFound`] if the root is missing, or
/// [`BoothError::Io`] if it cannot be listed.
pub fn discover_batches(archive_root: &Path) -> Result<Vec<Batch>> {
    if !archive_root.is_dir() {
        return Err(BoothError::ArchiveRootNotFound(archive_root.to_path_buf()));
    }

    let mut batches = Vec::new();
    for entry in fs::read_dir(archive_root)? {
        let entry = entry?;
        let path = entry.path();
        let is_candidate = entry.file_type().is_ok_and(|t| t.is_dir())
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(BATCH_FOLDER_PREFIX));
        if !is_candidate {
            continue;
        }
        match Batch::load(&path) {
            Some(batch) => batches.push(batch),
            None => debug!(folder = %path.display(), "Skipping folder without complete sidecar"),
        }
    }

    batches.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(
        root = %archive_root.display(),
        count = batches.len(),
        "Discovered batches"
    );
    Ok(batches)
}

/// Per-run replay results.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Delivered batches and where their folders now live.
    pub sent: Vec<(String, PathBuf)>,
    /// Batches that stay in place, with the reason.
    pub failed: Vec<(String, String)>,
    /// Batches whose email went out but whose folder could not be moved to
    /// `_sent/`, with the move error. These must not be resent.
    pub delivered_unmoved: Vec<(String, String)>,
}

impl ReplayReport {
    /// True when no batch failed to send. Delivered batches that stayed in
    /// place still count as sent.
    #[must_use]
    pub fn all_sent(&self) -> bool {
        self.failed.is_empty()
    }

    /// True when every batch was delivered and moved out of the root.
    #[must_use]
    pub fn all_moved(&self) -> bool {
        self.failed.is_empty() && self.delivered_unmoved.is_empty()
    }
}

/// What happened to one batch.
enum Resent {
    Moved(PathBuf),
    Unmoved(BoothError),
    NotDelivered(String),
}

/// Resends archived batches.
pub struct ReplayEngine<G> {
    archive_root: PathBuf,
    gateway: G,
    template: MessageTemplate,
    timeout: Duration,
}

impl<G: DeliveryGateway> ReplayEngine<G> {
    #[must_use]
    pub fn new(
        archive_root: impl Into<PathBuf>,
        gateway: G,
        template: MessageTemplate,
        timeout: Duration,
    ) -> Self {
        Self {
            archive_root: archive_root.into(),
            gateway,
            template,
            timeout,
        }
    }

    #[must_use]
    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Batches currently waiting under the archive root.
    ///
    /// # Errors
    ///
    /// See [`discover_batches`].
    pub fn discover(&self) -> Result<Vec<Batch>> {
        discover_batches(&self.archive_root)
    }

    /// Resends one batch. On delivery the folder moves to `_sent/`; on
    /// failure it is left untouched. A delivered batch that cannot be moved
    /// is still reported as delivered and logged.
    ///
    /// # Errors
    ///
    /// [`BoothError::ArchiveMissing`] if the batch folder has no archive.
    pub async fn resend(&self, batch: &Batch) -> Result<DeliveryOutcome> {
        Ok(match self.deliver(batch).await? {
            Resent::Moved(_) | Resent::Unmoved(_) => DeliveryOutcome::Delivered,
            Resent::NotDelivered(reason) => DeliveryOutcome::Failed(reason),
        })
    }

    async fn deliver(&self, batch: &Batch) -> Result<Resent> {
        let archive = batch.archive_path();
        if !archive.is_file() {
            return Err(BoothError::ArchiveMissing(archive));
        }

        let recipient = &batch.metadata.recipient;
        info!(
            batch = %batch.name,
            recipient = %recipient,
            photos = ?batch.metadata.photo_count,
            "Resending batch"
        );

        let outcome =
            attempt_delivery(&self.gateway, recipient, &archive, &self.template, self.timeout)
                .await;
        if let DeliveryOutcome::Failed(reason) = outcome {
            return Ok(Resent::NotDelivered(reason));
        }

        match self.move_to_sent(batch) {
            Ok(moved) => {
                info!(batch = %batch.name, sent_dir = %moved.display(), "Batch delivered");
                Ok(Resent::Moved(moved))
            }
            Err(err) => {
                warn!(
                    batch = %batch.name,
                    error = %err,
                    "Batch delivered but could not be moved to _sent; do not resend it"
                );
                Ok(Resent::Unmoved(err))
            }
        }
    }

    fn move_to_sent(&self, batch: &Batch) -> Result<PathBuf> {
        let sent_root = self.archive_root.join(SENT_FOLDER_NAME);
        fs::create_dir_all(&sent_root)?;
        let target = unique_path(&sent_root, &batch.name, None);
        move_path(&batch.dir, &target)?;
        Ok(target)
    }

    /// Resends `batches` in order. Each batch's result is independent.
    pub async fn replay_all(&self, batches: &[Batch]) -> ReplayReport {
        let mut report = ReplayReport::default();
        for batch in batches {
            match self.deliver(batch).await {
                Ok(Resent::Moved(sent_dir)) => report.sent.push((batch.name.clone(), sent_dir)),
                Ok(Resent::Unmoved(err)) => report
                    .delivered_unmoved
                    .push((batch.name.clone(), err.to_string())),
                Ok(Resent::NotDelivered(reason)) => {
                    warn!(batch = %batch.name, reason = %reason, "Batch not delivered");
                    report.failed.push((batch.name.clone(), reason));
                }
                Err(err) => {
                    warn!(batch = %batch.name, error = %err, "Batch skipped");
                    report.failed.push((batch.name.clone(), err.to_string()));
                }
            }
        }
        info!(
            sent = report.sent.len(),
            unmoved = report.delivered_unmoved.len(),
            failed = report.failed.len(),
            "Replay finished"
        );
        report
    }
}
