//! The in-memory capture session.
//!
//! A [`Session`] holds the current recipient, the photos captured for them so
//! far (in capture order) and the per-session sequence counter used to name
//! those photos. It performs no waiting and no delivery; the
//! [`engine`](crate::engine) drives it from a single task, which is what keeps
//! captures, recipient changes and flushes from interleaving.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BoothError, Result};
use crate::types::{Recipient, SessionMode};
use crate::utils::naming::{capture_extension, capture_file_name, unique_path};

/// Where session output goes. Both must be set before a capture is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Destinations {
    /// Directory for session zip files.
    pub output_dir: Option<PathBuf>,
    /// Root directory for unsent batch folders.
    pub archive_dir: Option<PathBuf>,
}

impl Destinations {
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: Some(output_dir.into()),
            archive_dir: Some(archive_dir.into()),
        }
    }

    /// Returns both directories, or the error for the first missing one.
    ///
    /// # Errors
    ///
    /// [`BoothError::NoOutputLocationConfigured`] or
    /// [`BoothError::NoArchiveLocationConfigured`].
    pub fn require(&self) -> Result<(&Path, &Path)> {
        let output = self
            .output_dir
            .as_deref()
            .ok_or(BoothError::NoOutputLocationConfigured)?;
        let archive = self
            .archive_dir
            .as_deref()
            .ok_or(BoothError::NoArchiveLocationConfigured)?;
        Ok((output, archive))
    }
}

/// Files handed over by [`Session::pending_flush`] for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlush {
    pub recipient: Recipient,
    pub files: Vec<PathBuf>,
}

/// Capture session state for the single active recipient.
#[derive(Debug, Default)]
pub struct Session {
    recipient: Option<Recipient>,
    sequence_counter: u32,
    captured_files: Vec<PathBuf>,
    mode: SessionMode,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn recipient(&self) -> Option<&Recipient> {
        self.recipient.as_ref()
    }

    #[must_use]
    pub fn sequence_counter(&self) -> u32 {
        self.sequence_counter
    }

    #[must_use]
    pub fn captured_files(&self) -> &[PathBuf] {
        &self.captured_files
    }

    #[must_use]
    pub fn has_files(&self) -> bool {
        !self.captured_files.is_empty()
    }

    #[must_use]
    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SessionMode) {
        self.mode = mode;
    }

    /// True if `path` is one of this session's renamed photos.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.captured_files.iter().any(|p| p == path)
    }

    /// True if switching to `recipient` would strand photos captured for the
    /// current one.
    #[must_use]
    pub fn needs_flush_before(&self, recipient: &Recipient) -> bool {
        self.has_files()
            && self
                .recipient
                .as_ref()
                .is_some_and(|current| current != recipient)
    }

    /// Replaces the recipient. Callers flush first when
    /// [`needs_flush_before`](Self::needs_flush_before) says so.
    ///
    /// The mode is left alone: it describes the last delivery attempt, not the
    /// recipient.
    pub fn set_recipient(&mut self, recipient: Recipient) {
        debug_assert!(!self.needs_flush_before(&recipient));
        self.recipient = Some(recipient);
    }

    /// Checks that a capture could be accepted right now, without touching
    /// anything.
    ///
    /// # Errors
    ///
    /// [`BoothError::NoRecipientSet`], [`BoothError::NoOutputLocationConfigured`]
    /// or [`BoothError::NoArchiveLocationConfigured`].
    pub fn check_ready(&self, destinations: &Destinations) -> Result<()> {
        if self.recipient.is_none() {
            return Err(BoothError::NoRecipientSet);
        }
        destinations.require()?;
        Ok(())
    }

    /// Renames `source` to `{local}_{n}.{ext}` beside it and records it.
    ///
    /// A file already holding that name (left behind by an abandoned
    /// session) is never overwritten; the new photo gets a `_2` style
    /// suffix instead. On any error the session is unchanged.
    ///
    /// # Errors
    ///
    /// The errors of [`check_ready`](Self::check_ready), or
    /// [`BoothError::Capture`] if the rename fails.
    pub fn capture(&mut self, source: &Path, destinations: &Destinations) -> Result<PathBuf> {
        self.check_ready(destinations)?;
        let recipient = self.recipient.as_ref().ok_or(BoothError::NoRecipientSet)?;

        let sequence = self.sequence_counter + 1;
        let name = capture_file_name(recipient, sequence, source);
        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        let target = unique_path(dir, &name, Some(&capture_extension(source)));

        fs::rename(source, &target).map_err(|source_err| BoothError::Capture {
            path: source.to_path_buf(),
            source: source_err,
        })?;

        self.sequence_counter = sequence;
        self.captured_files.push(target.clone());
        debug_assert_eq!(self.sequence_counter as usize, self.captured_files.len());

        debug!(
            source = %source.display(),
            target = %target.display(),
            sequence,
            "Captured photo"
        );

        Ok(target)
    }

    /// Hands the captured files over for a flush, leaving them in place.
    ///
    /// Returns `None` when there is nothing to send.
    #[must_use]
    pub fn pending_flush(&self) -> Option<PendingFlush> {
        if !self.has_files() {
            return None;
        }
        let recipient = self.recipient.clone()?;
        Some(PendingFlush {
            recipient,
            files: self.captured_files.clone(),
        })
    }

    /// Clears captured files and the counter. The recipient and mode persist.
    pub fn reset(&mut self) {
        self.captured_files.clear();
        self.sequence_counter = 0;
    }
}
