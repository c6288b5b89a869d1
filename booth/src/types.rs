//! Core value types for BoothMail capture sessions.
//!
//! This module defines the validated recipient address, the session mode flag,
//! delivery bookkeeping types and the [`StatusEvent`] surface through which
//! every session state transition is reported.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::BoothError;

/// A validated recipient email address.
///
/// Validation is deliberately loose (the mail transport is the real judge):
/// the address must be non-empty, contain no whitespace, and have a non-empty
/// local part and domain separated by `@`. The local part is used to build
/// file and folder names, so it must not contain path separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    /// Parses and validates a recipient address.
    ///
    /// Surrounding whitespace is trimmed before validation.
    ///
    /// # Errors
    ///
    /// Returns [`BoothError::InvalidRecipient`] if the address is empty or has
    /// no `@` between a local part and a domain.
    pub fn parse(address: &str) -> Result<Self, BoothError> {
        let address = address.trim();
        let invalid = || BoothError::InvalidRecipient(address.to_string());

        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let (local, domain) = address.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.is_empty() {
            return Err(invalid());
        }
        if local.contains(['/', '\\']) || local == "." || local == ".." {
            return Err(invalid());
        }

        Ok(Self(address.to_string()))
    }

    /// Returns the full address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the part before the first `@`.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the most recent flush for the current recipient was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Normal,
    /// The previous flush failed and was archived. Informational only; new
    /// captures are still accepted.
    Fallback,
}

/// The transport used for a delivery, recorded in batch metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Smtp,
    Api,
}

impl DeliveryMethod {
    /// The label written into the batch sidecar.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Smtp => "SMTP",
            Self::Api => "Gmail API",
        }
    }
}

impl fmt::Display for DeliveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of a single delivery attempt. Never partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    #[must_use]
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Session state transitions, as shown to whoever operates the booth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    RecipientSet {
        recipient: String,
    },
    CaptureAccepted {
        recipient: String,
        sequence: u32,
        path: PathBuf,
    },
    CaptureRejected {
        path: PathBuf,
        reason: String,
    },
    FlushStarted {
        recipient: String,
        photos: usize,
    },
    Delivered {
        recipient: String,
        photos: usize,
        archive: PathBuf,
    },
    FallbackEngaged {
        recipient: String,
        photos: usize,
        batch_dir: PathBuf,
        reason: String,
    },
    FallbackRecovered {
        recipient: String,
    },
    PackagingFailed {
        recipient: String,
        message: String,
    },
    ArchivingFailed {
        recipient: String,
        message: String,
    },
    CleanupFailed {
        path: PathBuf,
        message: String,
    },
    /// A captured photo could not be read at flush time and was left out of
    /// the archive.
    PhotoMissing {
        recipient: String,
        path: PathBuf,
        message: String,
    },
    /// A recipient change went ahead although the previous session could not
    /// be sent or archived. Its photos stay in the watch folder.
    SessionAbandoned {
        recipient: String,
        files: Vec<PathBuf>,
        reason: String,
    },
}

impl StatusEvent {
    /// True for events that imply someone has to follow up by hand.
    #[must_use]
    pub fn requires_attention(&self) -> bool {
        matches!(
            self,
            Self::FallbackEngaged { .. }
                | Self::PackagingFailed { .. }
                | Self::ArchivingFailed { .. }
                | Self::PhotoMissing { .. }
                | Self::SessionAbandoned { .. }
        )
    }

    /// One-line human readable rendering.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::RecipientSet { recipient } => format!("Monitoring for: {recipient}"),
            Self::CaptureAccepted {
                recipient,
                sequence,
                ..
            } => format!("Captured photo {sequence} for {recipient}"),
            Self::CaptureRejected { path, reason } => {
                format!("Ignored {}: {reason}", path.display())
            }
            Self::FlushStarted { recipient, photos } => {
                format!("Sending {photos} photos to {recipient}...")
            }
            Self::Delivered {
                recipient, photos, ..
            } => format!("Sent {photos} photos to {recipient}!"),
            Self::FallbackEngaged {
                recipient,
                batch_dir,
                reason,
                ..
            } => format!(
                "Delivery failed! Photos for {recipient} archived to {} ({reason}). Fallback mode active.",
                batch_dir.display()
            ),
            Self::FallbackRecovered { recipient } => format!(
                "Delivery recovered! Sent to {recipient}. Check the archive for unsent photos."
            ),
            Self::PackagingFailed { recipient, message } => {
                format!("Failed to package photos for {recipient}: {message}")
            }
            Self::ArchivingFailed { recipient, message } => format!(
                "Failed to archive photos for {recipient}: {message}. Photos left in the watch folder."
            ),
            Self::CleanupFailed { path, message } => {
                format!("Could not remove {}: {message}", path.display())
            }
            Self::PhotoMissing {
                recipient,
                path,
                message,
            } => format!(
                "Photo {} for {recipient} could not be read and was not sent: {message}",
                path.display()
            ),
            Self::SessionAbandoned {
                recipient,
                files,
                reason,
            } => {
                let names: Vec<String> = files
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .collect();
                format!(
                    "Could not send or archive {} photos for {recipient} ({reason}). \
                     Send them by hand from the watch folder: {}",
                    files.len(),
                    names.join(", ")
                )
            }
        }
    }
}
