//! The serialized session control loop.
//!
//! [`SessionEngine`] owns the [`Session`], the [`IdleTimer`], the configured
//! destinations and the delivery gateway. Everything that mutates the session
//! (a recipient change, a new file, a flush, an idle-timer fire) runs on the
//! engine's single task, one at a time:
//!
//! ```text
//! watcher ──┐
//! stdin   ──┼── Command ──> mpsc ──> SessionEngine::run ──> StatusEvent ──> mpsc ──> UI
//! tests   ──┘                          ▲
//!                    IdleTimer::expired┘
//! ```
//!
//! Commands are polled before the timer, and every accepted capture pushes the
//! deadline back, so a fire can never flush a photo captured after it was
//! scheduled.
//!
//! # Flush
//!
//! 1. package the captured files into a zip in the output directory,
//! 2. attempt delivery (bounded by the delivery timeout),
//! 3. on failure, move the zip into a batch folder under the archive root,
//! 4. delete the source photos and reset the session.
//!
//! Photos that can no longer be read are left out of the zip and reported.
//! Packaging and archiving failures stop at the failing step and leave the
//! session (and the source photos) intact for the next flush. A recipient
//! change is the exception: it abandons such a session, leaving the photos on
//! disk, so the next guest's photos never join it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::archiver::archive_batch;
use crate::config::Config;
use crate::delivery::{attempt_delivery, DeliveryGateway, MessageTemplate};
use crate::error::{BoothError, Result};
use crate::packager::{package, PackagingError};
use crate::session::{Destinations, Session};
use crate::timer::{IdleTimer, DEFAULT_IDLE_SECS};
use crate::types::{DeliveryOutcome, Recipient, SessionMode, StatusEvent};
use crate::utils::naming::timestamp_now;
use crate::utils::settle::{wait_until_settled, SettlePolicy};

/// Default bound on one delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 60;

/// Capacity of the command channel created by [`SessionEngine::spawn`].
pub const COMMAND_BUFFER: usize = 64;

/// Timing and message settings for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub idle_window: Duration,
    pub settle: SettlePolicy,
    pub delivery_timeout: Duration,
    pub template: MessageTemplate,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            idle_window: Duration::from_secs(DEFAULT_IDLE_SECS),
            settle: SettlePolicy::default(),
            delivery_timeout: Duration::from_secs(DEFAULT_DELIVERY_TIMEOUT_SECS),
            template: MessageTemplate::default(),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_window: config.idle_window,
            settle: config.settle,
            delivery_timeout: config.delivery_timeout,
            template: config.template.clone(),
        }
    }
}

/// What a flush did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// There were no captured files, or none of them could still be read.
    Empty,
    Delivered {
        archive: PathBuf,
        photos: usize,
        /// The session was in fallback mode before this delivery.
        recovered: bool,
    },
    /// Delivery failed and the session was archived as a batch.
    Archived {
        batch_dir: PathBuf,
        photos: usize,
        reason: String,
    },
}

/// Point-in-time view of the engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub recipient: Option<Recipient>,
    pub sequence_counter: u32,
    pub captured_files: Vec<PathBuf>,
    pub mode: SessionMode,
    pub timer_armed: bool,
}

/// Messages accepted by [`SessionEngine::run`].
#[derive(Debug)]
pub enum Command {
    SetRecipient {
        address: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// A new file appeared in the monitored location.
    FileCreated(PathBuf),
    SetDestinations(Destinations),
    Flush(oneshot::Sender<Result<FlushOutcome>>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Owner of the live session.
pub struct SessionEngine<G> {
    session: Session,
    timer: IdleTimer,
    destinations: Destinations,
    settings: EngineSettings,
    gateway: G,
    status: Option<mpsc::Sender<StatusEvent>>,
}

impl<G: DeliveryGateway> SessionEngine<G> {
    #[must_use]
    pub fn new(gateway: G, destinations: Destinations, settings: EngineSettings) -> Self {
        Self {
            session: Session::new(),
            timer: IdleTimer::new(settings.idle_window),
            destinations,
            settings,
            gateway,
            status: None,
        }
    }

    /// Forwards every status event to `tx`. Events are dropped, not awaited,
    /// when the channel is full.
    #[must_use]
    pub fn with_status(mut self, tx: mpsc::Sender<StatusEvent>) -> Self {
        self.status = Some(tx);
        self
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn timer(&self) -> &IdleTimer {
        &self.timer
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            recipient: self.session.recipient().cloned(),
            sequence_counter: self.session.sequence_counter(),
            captured_files: self.session.captured_files().to_vec(),
            mode: self.session.mode(),
            timer_armed: self.timer.is_armed(),
        }
    }

    pub fn set_destinations(&mut self, destinations: Destinations) {
        info!(
            output_dir = ?destinations.output_dir,
            archive_dir = ?destinations.archive_dir,
            "Destinations updated"
        );
        self.destinations = destinations;
    }

    /// Validates and sets the recipient.
    ///
    /// If photos are pending for a different recipient they are flushed
    /// first. When that flush cannot finish (the zip cannot be built or the
    /// batch cannot be written), the old session is abandoned: its photos
    /// stay in the watch folder, [`StatusEvent::SessionAbandoned`] lists
    /// them, and the new address is accepted anyway. Photos are never
    /// captured under the previous guest's name once a new address has been
    /// entered.
    ///
    /// # Errors
    ///
    /// [`BoothError::InvalidRecipient`] without touching the session.
    pub async fn set_recipient(&mut self, address: &str) -> Result<()> {
        let recipient = Recipient::parse(address)?;

        if self.session.needs_flush_before(&recipient) {
            info!(
                previous = ?self.session.recipient().map(Recipient::as_str),
                next = %recipient,
                "Recipient changed with pending photos, flushing first"
            );
            if let Err(err) = self.flush().await {
                self.abandon_session(&err);
            }
        }

        if self.session.recipient() != Some(&recipient) {
            self.session.set_recipient(recipient.clone());
            self.emit(StatusEvent::RecipientSet {
                recipient: recipient.to_string(),
            });
        }
        Ok(())
    }

    /// Drops the current session without deleting its photos.
    fn abandon_session(&mut self, err: &BoothError) {
        if let Some(pending) = self.session.pending_flush() {
            self.emit(StatusEvent::SessionAbandoned {
                recipient: pending.recipient.to_string(),
                files: pending.files,
                reason: err.to_string(),
            });
        }
        self.session.reset();
        self.timer.cancel();
    }

    /// Accepts a newly created file into the session.
    ///
    /// Waits for the file to settle, renames it to its session name and
    /// restarts the idle timer.
    ///
    /// # Errors
    ///
    /// The configuration-missing errors (checked before anything is touched),
    /// or [`BoothError::Capture`] if the file vanished or could not be renamed.
    pub async fn capture_file(&mut self, source: &Path) -> Result<PathBuf> {
        match self.try_capture(source).await {
            Ok(target) => {
                self.timer.restart(self.session.has_files());
                self.emit(StatusEvent::CaptureAccepted {
                    recipient: self
                        .session
                        .recipient()
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    sequence: self.session.sequence_counter(),
                    path: target.clone(),
                });
                Ok(target)
            }
            Err(err) => {
                self.emit(StatusEvent::CaptureRejected {
                    path: source.to_path_buf(),
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn try_capture(&mut self, source: &Path) -> Result<PathBuf> {
        self.session.check_ready(&self.destinations)?;
        wait_until_settled(source, &self.settings.settle)
            .await
            .map_err(|err| BoothError::Capture {
                path: source.to_path_buf(),
                source: err,
            })?;
        self.session.capture(source, &self.destinations)
    }

    /// Packages and delivers the current session, archiving it on failure.
    ///
    /// # Errors
    ///
    /// [`BoothError::Packaging`] or [`BoothError::Archiving`]. The session and
    /// its source photos are left in place in both cases.
    pub async fn flush(&mut self) -> Result<FlushOutcome> {
        let Some(pending) = self.session.pending_flush() else {
            self.timer.cancel();
            return Ok(FlushOutcome::Empty);
        };
        let recipient = pending.recipient;
        let photos = pending.files.len();

        self.emit(StatusEvent::FlushStarted {
            recipient: recipient.to_string(),
            photos,
        });

        let (output_dir, archive_root) = match self.destinations.require() {
            Ok((out, archive)) => (out.to_path_buf(), archive.to_path_buf()),
            Err(err) => {
                self.timer.cancel();
                self.emit(StatusEvent::PackagingFailed {
                    recipient: recipient.to_string(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        let timestamp = timestamp_now();
        let mut files = pending.files;
        let archive = match self.package_readable(&mut files, &recipient, &output_dir, &timestamp) {
            Ok(Some(path)) => path,
            Ok(None) => {
                // Every photo vanished; there is nothing left to send.
                self.session.reset();
                self.timer.cancel();
                return Ok(FlushOutcome::Empty);
            }
            Err(err) => {
                self.timer.cancel();
                self.emit(StatusEvent::PackagingFailed {
                    recipient: recipient.to_string(),
                    message: err.to_string(),
                });
                return Err(err.into());
            }
        };
        let photos = files.len();

        let outcome = attempt_delivery(
            &self.gateway,
            &recipient,
            &archive,
            &self.settings.template,
            self.settings.delivery_timeout,
        )
        .await;

        let result = match outcome {
            DeliveryOutcome::Delivered => {
                let recovered = self.session.mode() == SessionMode::Fallback;
                self.session.set_mode(SessionMode::Normal);
                self.emit(StatusEvent::Delivered {
                    recipient: recipient.to_string(),
                    photos,
                    archive: archive.clone(),
                });
                if recovered {
                    self.emit(StatusEvent::FallbackRecovered {
                        recipient: recipient.to_string(),
                    });
                }
                FlushOutcome::Delivered {
                    archive,
                    photos,
                    recovered,
                }
            }
            DeliveryOutcome::Failed(reason) => {
                self.session.set_mode(SessionMode::Fallback);
                match archive_batch(
                    &archive_root,
                    &archive,
                    &recipient,
                    photos,
                    self.gateway.method(),
                    &timestamp,
                ) {
                    Ok(batch) => {
                        self.emit(StatusEvent::FallbackEngaged {
                            recipient: recipient.to_string(),
                            photos,
                            batch_dir: batch.dir.clone(),
                            reason: reason.clone(),
                        });
                        FlushOutcome::Archived {
                            batch_dir: batch.dir,
                            photos,
                            reason,
                        }
                    }
                    Err(err) => {
                        // The source photos are the only complete copy now.
                        if let Err(remove_err) = fs::remove_file(&archive) {
                            debug!(
                                archive = %archive.display(),
                                error = %remove_err,
                                "Could not remove unarchived zip"
                            );
                        }
                        self.timer.cancel();
                        self.emit(StatusEvent::ArchivingFailed {
                            recipient: recipient.to_string(),
                            message: err.to_string(),
                        });
                        return Err(err.into());
                    }
                }
            }
        };

        self.remove_sources(&files);
        self.session.reset();
        self.timer.cancel();
        Ok(result)
    }

    /// Packages `files`, leaving out any photo that cannot be read.
    ///
    /// Each dropped photo is reported with [`StatusEvent::PhotoMissing`] and
    /// removed from `files`. Returns `None` once no readable photo is left.
    fn package_readable(
        &self,
        files: &mut Vec<PathBuf>,
        recipient: &Recipient,
        output_dir: &Path,
        timestamp: &str,
    ) -> std::result::Result<Option<PathBuf>, PackagingError> {
        loop {
            if files.is_empty() {
                return Ok(None);
            }
            match package(files, recipient, output_dir, timestamp) {
                Ok(archive) => return Ok(Some(archive)),
                Err(PackagingError::UnreadableInput { path, source }) => {
                    let before = files.len();
                    files.retain(|f| *f != path);
                    if files.len() == before {
                        return Err(PackagingError::UnreadableInput { path, source });
                    }
                    self.emit(StatusEvent::PhotoMissing {
                        recipient: recipient.to_string(),
                        path,
                        message: source.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn remove_sources(&self, files: &[PathBuf]) {
        for path in files {
            if let Err(err) = fs::remove_file(path) {
                self.emit(StatusEvent::CleanupFailed {
                    path: path.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    /// Stops the idle timer. Pending photos stay on disk.
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        let pending = self.session.captured_files().len();
        if pending > 0 {
            warn!(
                recipient = ?self.session.recipient().map(Recipient::as_str),
                photos = pending,
                "Shutting down with unsent photos in the watch folder"
            );
        } else {
            info!("Session engine stopped");
        }
    }

    fn emit(&self, event: StatusEvent) {
        let text = event.describe();
        match &event {
            StatusEvent::PackagingFailed { .. }
            | StatusEvent::ArchivingFailed { .. }
            | StatusEvent::PhotoMissing { .. }
            | StatusEvent::SessionAbandoned { .. } => {
                error!(status = ?event, "{text}");
            }
            StatusEvent::FallbackEngaged { .. }
            | StatusEvent::CaptureRejected { .. }
            | StatusEvent::CleanupFailed { .. } => warn!(status = ?event, "{text}"),
            _ => info!("{text}"),
        }

        if let Some(tx) = &self.status {
            if let Err(err) = tx.try_send(event) {
                trace!(error = %err, "Status event not forwarded");
            }
        }
    }

    /// Applies one command. Returns `false` once the engine should stop.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::SetRecipient { address, reply } => {
                let result = self.set_recipient(&address).await;
                let _ = reply.send(result);
            }
            Command::FileCreated(path) => {
                if self.session.contains(&path) {
                    trace!(path = %path.display(), "Ignoring our own rename");
                } else if let Err(err) = self.capture_file(&path).await {
                    debug!(path = %path.display(), error = %err, "Capture rejected");
                }
            }
            Command::SetDestinations(destinations) => self.set_destinations(destinations),
            Command::Flush(reply) => {
                let result = self.flush().await;
                let _ = reply.send(result);
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// Runs until [`Command::Shutdown`] arrives or every handle is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(
            idle_secs = self.settings.idle_window.as_secs(),
            method = %self.gateway.method(),
            "Session engine started"
        );

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                () = self.timer.expired() => {
                    debug!("Idle window elapsed");
                    if let Err(err) = self.flush().await {
                        error!(error = %err, "Idle flush failed");
                    }
                }
            }
        }

        self.shutdown();
    }
}

impl<G: DeliveryGateway + 'static> SessionEngine<G> {
    /// Runs the engine on its own task.
    #[must_use]
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(rx));
        (EngineHandle::new(tx), task)
    }
}

/// Cloneable front end to a running [`SessionEngine`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Command>,
}

impl EngineHandle {
    #[must_use]
    pub fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| BoothError::EngineStopped)
    }

    /// # Errors
    ///
    /// See [`SessionEngine::set_recipient`], or [`BoothError::EngineStopped`].
    pub async fn set_recipient(&self, address: impl Into<String>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetRecipient {
            address: address.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| BoothError::EngineStopped)?
    }

    /// Queues a file-created notification.
    ///
    /// # Errors
    ///
    /// [`BoothError::EngineStopped`].
    pub async fn file_created(&self, path: impl Into<PathBuf>) -> Result<()> {
        self.send(Command::FileCreated(path.into())).await
    }

    /// # Errors
    ///
    /// [`BoothError::EngineStopped`].
    pub async fn set_destinations(&self, destinations: Destinations) -> Result<()> {
        self.send(Command::SetDestinations(destinations)).await
    }

    /// # Errors
    ///
    /// See [`SessionEngine::flush`], or [`BoothError::EngineStopped`].
    pub async fn flush(&self) -> Result<FlushOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush(reply)).await?;
        rx.await.map_err(|_| BoothError::EngineStopped)?
    }

    /// # Errors
    ///
    /// [`BoothError::EngineStopped`].
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply)).await?;
        rx.await.map_err(|_| BoothError::EngineStopped)
    }

    /// # Errors
    ///
    /// [`BoothError::EngineStopped`] if the engine already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }
}
