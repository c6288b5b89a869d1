//! Waiting for a newly created file to finish being written.
//!
//! Booth software usually creates the file first and streams the JPEG into it
//! afterwards, so a creation notification arrives before the photo is complete.
//! [`wait_until_settled`] sleeps for a fixed settle delay and then polls the
//! file's size and modification time until two consecutive readings agree.
//!
//! This is a heuristic: a writer that stalls for longer than the poll interval
//! is indistinguishable from a finished one. The poll is bounded by
//! [`SettlePolicy::max_wait`], after which the file is used as-is.

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::time::{sleep, Instant};
use tracing::{trace, warn};

/// Default interval between stability checks.
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Timing parameters for [`wait_until_settled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Fixed delay before the first check.
    pub delay: Duration,
    /// Interval between size/mtime checks.
    pub poll_interval: Duration,
    /// Upper bound on time spent polling after `delay`.
    pub max_wait: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_wait: Duration::from_secs(5),
        }
    }
}

impl SettlePolicy {
    /// A policy that does not wait at all.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }
}

fn snapshot(path: &Path) -> io::Result<(u64, Option<SystemTime>)> {
    let meta = fs::metadata(path)?;
    Ok((meta.len(), meta.modified().ok()))
}

/// Waits until `path` looks fully written.
///
/// # Errors
///
/// Returns the I/O error if the file disappears or cannot be inspected.
pub async fn wait_until_settled(path: &Path, policy: &SettlePolicy) -> io::Result<()> {
    if !policy.delay.is_zero() {
        sleep(policy.delay).await;
    }

    let mut previous = snapshot(path)?;
    if policy.max_wait.is_zero() {
        return Ok(());
    }

    let deadline = Instant::now() + policy.max_wait;
    loop {
        sleep(policy.poll_interval).await;
        let current = snapshot(path)?;
        if current == previous {
            trace!(path = %path.display(), size = current.0, "File settled");
            return Ok(());
        }
        if Instant::now() >= deadline {
            warn!(
                path = %path.display(),
                size = current.0,
                "File still changing after settle window, using it anyway"
            );
            return Ok(());
        }
        previous = current;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stable_file_settles_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_1.jpg");
        fs::write(&path, b"jpeg").unwrap();

        let start = Instant::now();
        wait_until_settled(&path, &SettlePolicy::default())
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = wait_until_settled(&dir.path().join("nope.jpg"), &SettlePolicy::immediate())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn immediate_policy_only_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("IMG_2.jpg");
        fs::write(&path, b"jpeg").unwrap();
        assert!(wait_until_settled(&path, &SettlePolicy::immediate())
            .await
            .is_ok());
    }
}
