//! Shared fixtures for BoothMail integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use boothmail::delivery::{DeliveryError, DeliveryGateway};
use boothmail::session::Destinations;
use boothmail::types::{DeliveryMethod, Recipient};
use tempfile::TempDir;

// =============================================================================
// Recording Gateway
// =============================================================================

/// One call seen by [`RecordingGateway`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub recipient: String,
    pub archive: PathBuf,
    /// Entry names inside the archive at send time.
    pub entries: Vec<String>,
    pub subject: String,
    pub delivered: bool,
}

#[derive(Debug, Default)]
struct Inner {
    /// Per-call results, consumed front to back. Empty means `default_ok`.
    script: Mutex<VecDeque<bool>>,
    fail_by_default: AtomicBool,
    delay: Mutex<Duration>,
    calls: Mutex<Vec<SentMessage>>,
}

/// Scripted gateway that records every send.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    inner: Arc<Inner>,
}

impl RecordingGateway {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.fail_by_default.store(failing, Ordering::SeqCst);
    }

    /// Queues explicit results for the next calls (`true` = delivered).
    pub fn script(&self, results: &[bool]) {
        self.inner.script.lock().unwrap().extend(results);
    }

    /// Makes every send take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<SentMessage> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryGateway for RecordingGateway {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Smtp
    }

    async fn send(
        &self,
        recipient: &Recipient,
        archive: &Path,
        subject: &str,
        _body: &str,
    ) -> Result<(), DeliveryError> {
        let delivered = self
            .inner
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(!self.inner.fail_by_default.load(Ordering::SeqCst));

        self.inner.calls.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            archive: archive.to_path_buf(),
            entries: zip_entries(archive),
            subject: subject.to_string(),
            delivered,
        });

        let delay = *self.inner.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if delivered {
            Ok(())
        } else {
            Err(DeliveryError::Rejected {
                status: 421,
                message: "service not available".to_string(),
            })
        }
    }
}

// =============================================================================
// Filesystem Fixtures
// =============================================================================

/// A temporary booth layout: watch, output and archive directories.
pub struct BoothDirs {
    _root: TempDir,
    pub watch: PathBuf,
    pub output: PathBuf,
    pub archive: PathBuf,
}

impl BoothDirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let watch = root.path().join("watch");
        let output = root.path().join("zips");
        let archive = root.path().join("unsent");
        fs::create_dir_all(&watch).unwrap();
        Self {
            _root: root,
            watch,
            output,
            archive,
        }
    }

    pub fn destinations(&self) -> Destinations {
        Destinations::new(&self.output, &self.archive)
    }

    /// Writes a fake photo into the watch directory.
    pub fn drop_photo(&self, name: &str) -> PathBuf {
        let path = self.watch.join(name);
        fs::write(&path, format!("jpeg bytes of {name}")).unwrap();
        path
    }

    pub fn watch_entries(&self) -> Vec<String> {
        sorted_names(&self.watch)
    }

    pub fn archive_entries(&self) -> Vec<String> {
        if self.archive.exists() {
            sorted_names(&self.archive)
        } else {
            Vec::new()
        }
    }
}

pub fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

/// Entry names of a zip, or empty if it cannot be opened.
pub fn zip_entries(path: &Path) -> Vec<String> {
    let Ok(file) = File::open(path) else {
        return Vec::new();
    };
    let Ok(mut zip) = zip::ZipArchive::new(file) else {
        return Vec::new();
    };
    (0..zip.len())
        .filter_map(|i| zip.by_index(i).ok().map(|e| e.name().to_string()))
        .collect()
}
