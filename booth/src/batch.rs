//! On-disk format of an archived batch.
//!
//! A batch is a folder `unsent_{local}_{timestamp}` under the archive root
//! holding exactly one session zip and a `SEND_TO.txt` sidecar:
//!
//! ```text
//! RECIPIENT EMAIL: bob@y.com
//! TIMESTAMP: 20261014_101500
//! ZIP FILE: photos_bob_20261014_101500.zip
//! NUMBER OF PHOTOS: 2
//! METHOD: SMTP
//!
//! INSTRUCTIONS:
//! SMTP sending failed when trying to send these photos.
//! Please manually send the zip file to: bob@y.com
//! ```
//!
//! The folder is the unit of replay: the sidecar and the archive always move
//! together.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::Recipient;
use crate::utils::naming::METADATA_FILE_NAME;

const KEY_RECIPIENT: &str = "RECIPIENT EMAIL:";
const KEY_TIMESTAMP: &str = "TIMESTAMP:";
const KEY_ARCHIVE: &str = "ZIP FILE:";
const KEY_PHOTOS: &str = "NUMBER OF PHOTOS:";
const KEY_METHOD: &str = "METHOD:";
const KEY_INSTRUCTIONS: &str = "INSTRUCTIONS:";

/// Contents of a batch sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMetadata {
    pub recipient: Recipient,
    pub timestamp: Option<String>,
    /// Archive filename relative to the batch folder.
    pub archive_file: String,
    pub photo_count: Option<usize>,
    /// Transport label at the time of the failed attempt, e.g. `SMTP`.
    /// Sidecars written by the API-only booth carry no method line.
    pub method: Option<String>,
    pub instructions: String,
}

impl BatchMetadata {
    /// Recovery text written for a batch that `method` failed to deliver.
    #[must_use]
    pub fn recovery_instructions(method: &str, recipient: &Recipient) -> String {
        format!(
            "{method} sending failed when trying to send these photos.\n\
             Please manually send the zip file to: {recipient}"
        )
    }

    /// Renders the sidecar text. Absent optional fields are left out.
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!("{KEY_RECIPIENT} {}\n", self.recipient);
        if let Some(timestamp) = &self.timestamp {
            text.push_str(&format!("{KEY_TIMESTAMP} {timestamp}\n"));
        }
        text.push_str(&format!("{KEY_ARCHIVE} {}\n", self.archive_file));
        if let Some(count) = self.photo_count {
            text.push_str(&format!("{KEY_PHOTOS} {count}\n"));
        }
        if let Some(method) = &self.method {
            text.push_str(&format!("{KEY_METHOD} {method}\n"));
        }
        text.push_str(&format!("\n{KEY_INSTRUCTIONS}\n{}\n", self.instructions));
        text
    }

    /// Label for display, `unknown` when the sidecar names no method.
    #[must_use]
    pub fn method_label(&self) -> &str {
        self.method.as_deref().unwrap_or("unknown")
    }

    /// Parses sidecar text.
    ///
    /// Only the recipient and the archive filename are required; a sidecar
    /// without them is `None`. Timestamp, photo count and method are kept
    /// when present and readable.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut recipient = None;
        let mut timestamp = None;
        let mut archive_file = None;
        let mut photo_count = None;
        let mut method = None;
        let mut instructions: Option<Vec<&str>> = None;

        for line in text.lines() {
            if let Some(lines) = instructions.as_mut() {
                lines.push(line);
                continue;
            }
            let line = line.trim_end();
            if line == KEY_INSTRUCTIONS {
                instructions = Some(Vec::new());
            } else if let Some(v) = line.strip_prefix(KEY_RECIPIENT) {
                recipient = Recipient::parse(v).ok();
            } else if let Some(v) = line.strip_prefix(KEY_TIMESTAMP) {
                timestamp = non_empty(v);
            } else if let Some(v) = line.strip_prefix(KEY_ARCHIVE) {
                archive_file = non_empty(v);
            } else if let Some(v) = line.strip_prefix(KEY_PHOTOS) {
                photo_count = v.trim().parse().ok();
            } else if let Some(v) = line.strip_prefix(KEY_METHOD) {
                method = non_empty(v);
            }
        }

        let archive_file = archive_file?;
        // The archive must live directly inside the batch folder.
        if archive_file.contains(['/', '\\']) || archive_file == ".." {
            return None;
        }

        Some(Self {
            recipient: recipient?,
            timestamp,
            archive_file,
            photo_count,
            method,
            instructions: instructions
                .map(|lines| lines.join("\n").trim().to_string())
                .unwrap_or_default(),
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// A batch folder with its parsed metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub dir: PathBuf,
    /// Folder name, e.g. `unsent_bob_20261014_101500`.
    pub name: String,
    pub metadata: BatchMetadata,
}

impl Batch {
    /// Loads the batch in `dir`. Returns `None` when the sidecar is missing,
    /// unreadable or incomplete.
    #[must_use]
    pub fn load(dir: &Path) -> Option<Self> {
        let name = dir.file_name()?.to_str()?.to_string();
        let sidecar = dir.join(METADATA_FILE_NAME);
        let text = match fs::read_to_string(&sidecar) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %sidecar.display(), error = %err, "No readable sidecar");
                return None;
            }
        };
        let Some(metadata) = BatchMetadata::parse(&text) else {
            debug!(path = %sidecar.display(), "Incomplete sidecar");
            return None;
        };
        Some(Self {
            dir: dir.to_path_buf(),
            name,
            metadata,
        })
    }

    #[must_use]
    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(&self.metadata.archive_file)
    }

    #[must_use]
    pub fn sidecar_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bob_metadata() -> BatchMetadata {
        let recipient = Recipient::parse("bob@y.com").unwrap();
        BatchMetadata {
            instructions: BatchMetadata::recovery_instructions("SMTP", &recipient),
            recipient,
            timestamp: Some("20261014_101500".into()),
            archive_file: "photos_bob_20261014_101500.zip".into(),
            photo_count: Some(2),
            method: Some("SMTP".into()),
        }
    }

    #[test]
    fn render_matches_sidecar_layout() {
        let text = bob_metadata().render();
        assert_eq!(
            text,
            "RECIPIENT EMAIL: bob@y.com\n\
             TIMESTAMP: 20261014_101500\n\
             ZIP FILE: photos_bob_20261014_101500.zip\n\
             NUMBER OF PHOTOS: 2\n\
             METHOD: SMTP\n\
             \n\
             INSTRUCTIONS:\n\
             SMTP sending failed when trying to send these photos.\n\
             Please manually send the zip file to: bob@y.com\n"
        );
        assert_eq!(BatchMetadata::parse(&text), Some(bob_metadata()));
    }

    #[test]
    fn parse_accepts_sidecar_without_instructions() {
        let text = "RECIPIENT EMAIL: bob@y.com\nTIMESTAMP: 20261014_101500\n\
                    ZIP FILE: photos_bob.zip\nNUMBER OF PHOTOS: 4\nMETHOD: Gmail API\n";
        let meta = BatchMetadata::parse(text).unwrap();
        assert_eq!(meta.photo_count, Some(4));
        assert_eq!(meta.method.as_deref(), Some("Gmail API"));
        assert!(meta.instructions.is_empty());
    }

    #[test]
    fn parse_requires_recipient_and_archive() {
        let full = bob_metadata().render();
        for key in [KEY_RECIPIENT, KEY_ARCHIVE] {
            let without: String = full
                .lines()
                .filter(|l| !l.starts_with(key))
                .map(|l| format!("{l}\n"))
                .collect();
            assert!(BatchMetadata::parse(&without).is_none(), "missing {key}");
        }
        assert!(
            BatchMetadata::parse(&full.replace("bob@y.com", "not-an-address")).is_none()
        );
    }

    #[test]
    fn parse_tolerates_missing_optional_fields() {
        let full = bob_metadata().render();
        let without: String = full
            .lines()
            .filter(|l| !l.starts_with(KEY_TIMESTAMP) && !l.starts_with(KEY_METHOD))
            .map(|l| format!("{l}\n"))
            .collect();
        let meta = BatchMetadata::parse(&without).unwrap();
        assert_eq!(meta.timestamp, None);
        assert_eq!(meta.method, None);
        assert_eq!(meta.method_label(), "unknown");
        assert_eq!(meta.photo_count, Some(2));

        let garbled =
            BatchMetadata::parse(&full.replace("NUMBER OF PHOTOS: 2", "NUMBER OF PHOTOS: two"))
                .unwrap();
        assert_eq!(garbled.photo_count, None);
    }

    /// The API-only booth writes no method line and a quota message.
    #[test]
    fn parse_accepts_api_booth_sidecar() {
        let text = "RECIPIENT EMAIL: bob@y.com\n\
                    TIMESTAMP: 20261014_101500\n\
                    ZIP FILE: photos_bob_20261014_101500.zip\n\
                    NUMBER OF PHOTOS: 3\n\
                    \n\
                    INSTRUCTIONS:\n\
                    Gmail API quota was exceeded when trying to send these photos.\n\
                    Please manually send the zip file to: bob@y.com\n";
        let meta = BatchMetadata::parse(text).unwrap();
        assert_eq!(meta.recipient.as_str(), "bob@y.com");
        assert_eq!(meta.archive_file, "photos_bob_20261014_101500.zip");
        assert_eq!(meta.photo_count, Some(3));
        assert_eq!(meta.method, None);
        assert!(meta.instructions.starts_with("Gmail API quota was exceeded"));

        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("unsent_bob_20261014_101500");
        fs::create_dir(&folder).unwrap();
        fs::write(folder.join(METADATA_FILE_NAME), text).unwrap();
        assert!(Batch::load(&folder).is_some());
    }

    #[test]
    fn parse_rejects_archive_outside_folder() {
        let text = bob_metadata()
            .render()
            .replace("photos_bob_20261014_101500.zip", "../elsewhere.zip");
        assert!(BatchMetadata::parse(&text).is_none());
    }

    #[test]
    fn load_skips_folder_without_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("unsent_bob_20261014_101500");
        fs::create_dir(&folder).unwrap();
        assert!(Batch::load(&folder).is_none());

        fs::write(folder.join(METADATA_FILE_NAME), bob_metadata().render()).unwrap();
        let batch = Batch::load(&folder).unwrap();
        assert_eq!(batch.name, "unsent_bob_20261014_101500");
        assert_eq!(
            batch.archive_path(),
            folder.join("photos_bob_20261014_101500.zip")
        );
    }
}
