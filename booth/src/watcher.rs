//! Directory watcher feeding new photos to the session engine.
//!
//! Watches one directory (non-recursively) through [`notify`] and reports a
//! [`WatchEvent::FileCreated`] for every new file whose extension is in the
//! configured list. The notify callback runs on notify's own thread; it only
//! filters and `try_send`s into a tokio channel, so nothing touches session
//! state outside the engine task.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tokio::sync::mpsc;
//! use boothmail::watcher::{DirectoryWatcher, WatchEvent};
//!
//! # async fn demo() -> Result<(), boothmail::watcher::WatcherError> {
//! let (tx, mut rx) = mpsc::channel(100);
//! let _watcher = DirectoryWatcher::new(PathBuf::from("/srv/booth"), &["jpg".into()], tx)?;
//!
//! while let Some(WatchEvent::FileCreated(path)) = rx.recv().await {
//!     println!("New photo: {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use notify::{
    event::CreateKind, Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

/// Events emitted by the directory watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A new image file appeared in the watched directory.
    FileCreated(PathBuf),
}

/// Errors that can occur while setting up the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The watch directory does not exist or is not a directory.
    #[error("watch directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// The receiving side of the event channel is gone.
    #[error("failed to send event: channel closed")]
    ChannelClosed,
}

/// Watches one directory for new images.
///
/// Dropping the watcher stops the subscription.
#[derive(Debug)]
pub struct DirectoryWatcher {
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
    watch_dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryWatcher {
    /// Starts watching `watch_dir` and sends accepted creations to `events`.
    ///
    /// `extensions` are matched case-insensitively, without the dot.
    ///
    /// # Errors
    ///
    /// [`WatcherError::DirectoryNotFound`] if `watch_dir` is not a directory,
    /// [`WatcherError::ChannelClosed`] if `events` is already closed, or
    /// [`WatcherError::WatcherInit`] if notify cannot start.
    pub fn new(
        watch_dir: PathBuf,
        extensions: &[String],
        events: mpsc::Sender<WatchEvent>,
    ) -> Result<Self, WatcherError> {
        if !watch_dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(watch_dir));
        }
        if events.is_closed() {
            return Err(WatcherError::ChannelClosed);
        }

        let extensions: Vec<String> = extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let filter = extensions.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| handle_notify_event(res, &filter, &events),
            Config::default(),
        )?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        info!(
            watch_dir = %watch_dir.display(),
            extensions = ?extensions,
            "Watching for new photos"
        );

        Ok(Self {
            watcher,
            watch_dir,
            extensions,
        })
    }

    #[must_use]
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}

/// True if `path` has one of `extensions` (already lower-cased).
#[must_use]
pub fn has_accepted_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|accepted| *accepted == ext)
        })
}

fn handle_notify_event(
    res: Result<Event, notify::Error>,
    extensions: &[String],
    events: &mpsc::Sender<WatchEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    if !matches!(
        event.kind,
        EventKind::Create(CreateKind::File) | EventKind::Create(CreateKind::Any)
    ) {
        return;
    }

    for path in event.paths {
        if !has_accepted_extension(&path, extensions) {
            debug!(path = %path.display(), "Ignoring non-image file");
            continue;
        }
        // Never block the notify thread.
        if let Err(e) = events.try_send(WatchEvent::FileCreated(path)) {
            warn!(error = %e, "Failed to queue watch event, channel may be full");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn extension_filter_is_case_insensitive() {
        let exts = vec!["jpg".to_string(), "jpeg".to_string()];
        assert!(has_accepted_extension(Path::new("/w/IMG_1.JPG"), &exts));
        assert!(has_accepted_extension(Path::new("/w/a.jpeg"), &exts));
        assert!(!has_accepted_extension(Path::new("/w/a.png"), &exts));
        assert!(!has_accepted_extension(Path::new("/w/README"), &exts));
    }

    #[tokio::test]
    async fn missing_directory_is_rejected() {
        let (tx, _rx) = mpsc::channel(10);
        let result = DirectoryWatcher::new(PathBuf::from("/nonexistent/path"), &[], tx);
        assert!(matches!(result, Err(WatcherError::DirectoryNotFound(_))));
    }

    #[tokio::test]
    async fn extensions_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, _rx) = mpsc::channel(10);
        let watcher = DirectoryWatcher::new(
            dir.path().to_path_buf(),
            &[".JPG".to_string(), "jpeg".to_string()],
            tx,
        )
        .unwrap();
        assert_eq!(watcher.extensions(), ["jpg", "jpeg"]);
        assert_eq!(watcher.watch_dir(), dir.path());
    }

    #[tokio::test]
    async fn reports_new_images_only() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(10);
        let _watcher =
            DirectoryWatcher::new(dir.path().to_path_buf(), &["jpg".to_string()], tx).unwrap();

        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::write(dir.path().join("IMG_0001.jpg"), b"jpeg").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watch event")
            .unwrap();
        let WatchEvent::FileCreated(path) = event;
        assert_eq!(path.file_name().unwrap(), "IMG_0001.jpg");
    }

    #[test]
    fn error_display() {
        let err = WatcherError::DirectoryNotFound(PathBuf::from("/test/path"));
        assert_eq!(err.to_string(), "watch directory does not exist: /test/path");
        assert_eq!(
            WatcherError::ChannelClosed.to_string(),
            "failed to send event: channel closed"
        );
    }
}
