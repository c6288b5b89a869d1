//! Error types for BoothMail.
//!
//! Each concern has its own error enum (configuration, packaging, archiving,
//! delivery, watching). [`BoothError`] gathers them for the session and replay
//! operations exposed by the crate.

use std::path::PathBuf;

use thiserror::Error;

use crate::archiver::ArchivingError;
use crate::config::ConfigError;
use crate::packager::PackagingError;
use crate::watcher::WatcherError;

/// Errors that can occur during BoothMail operations.
///
/// Delivery failures are intentionally absent: they are absorbed into the
/// fallback workflow and surface as
/// [`DeliveryOutcome::Failed`](crate::types::DeliveryOutcome::Failed).
#[derive(Error, Debug)]
pub enum BoothError {
    /// The address is empty or lacks a local part and domain.
    #[error("invalid recipient address: {0:?}")]
    InvalidRecipient(String),

    /// A file arrived before any recipient was entered.
    #[error("no recipient set")]
    NoRecipientSet,

    /// The archive-output directory has not been configured.
    #[error("no output location configured")]
    NoOutputLocationConfigured,

    /// The fallback-archive directory has not been configured.
    #[error("no archive location configured")]
    NoArchiveLocationConfigured,

    /// Moving a newly observed file to its session name failed.
    #[error("failed to capture {}: {source}", .path.display())]
    Capture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The session archive could not be built.
    #[error("packaging error: {0}")]
    Packaging(#[from] PackagingError),

    /// The fallback archive could not be written. Photos may be at risk.
    #[error("archiving error: {0}")]
    Archiving(#[from] ArchivingError),

    /// A batch folder no longer contains its archive file.
    #[error("archive file missing: {}", .0.display())]
    ArchiveMissing(PathBuf),

    /// The archive root handed to the replay engine does not exist.
    #[error("archive directory not found: {}", .0.display())]
    ArchiveRootNotFound(PathBuf),

    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File watching error.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session engine task is no longer running.
    #[error("session engine stopped")]
    EngineStopped,
}

impl BoothError {
    /// True for the errors raised when a required destination is missing.
    #[must_use]
    pub fn is_configuration_missing(&self) -> bool {
        matches!(
            self,
            Self::NoRecipientSet | Self::NoOutputLocationConfigured | Self::NoArchiveLocationConfigured
        )
    }
}

/// A specialized `Result` type for BoothMail operations.
pub type Result<T> = std::result::Result<T, BoothError>;
