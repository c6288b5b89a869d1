//! BoothMail - photo booth capture sessions delivered by email.
//!
//! This crate groups the photos a booth drops into a directory into a session
//! for one guest's email address, zips the session once the booth goes quiet,
//! and mails the zip. Sessions that cannot be delivered are kept on disk in
//! self-describing batch folders that the replay engine can resend later.
//!
//! # Overview
//!
//! ```text
//! DirectoryWatcher -> SessionEngine (rename, append, restart IdleTimer)
//!                       -> idle fire or recipient change
//!                       -> package -> attempt_delivery
//!                            -> delivered: reset session
//!                            -> failed: archive_batch, reset session
//!
//! ReplayEngine: discover_batches -> resend -> move to _sent/
//! ```
//!
//! # Modules
//!
//! - [`types`]: Recipient, session mode and status event types
//! - [`error`]: Crate-wide error type
//! - [`config`]: Configuration from environment variables
//! - [`session`]: The in-memory capture session
//! - [`timer`]: The idle timer that ends a session
//! - [`packager`]: Zip archive creation
//! - [`batch`]: On-disk batch folder format
//! - [`archiver`]: Fallback archiving of undelivered sessions
//! - [`delivery`]: Delivery gateway trait and the SMTP and API transports
//! - [`engine`]: The serialized session control loop
//! - [`replay`]: Resending archived batches
//! - [`watcher`]: Directory watcher for new photos
//! - [`utils`]: Naming, file-readiness and filesystem helpers

pub mod archiver;
pub mod batch;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod packager;
pub mod replay;
pub mod session;
pub mod timer;
pub mod types;
pub mod utils;
pub mod watcher;

pub use archiver::{archive_batch, ArchivingError};
pub use batch::{Batch, BatchMetadata};
pub use config::{Config, ConfigError, TransportConfig};
pub use delivery::{
    attempt_delivery, DeliveryError, DeliveryGateway, MessageTemplate, Transport,
};
pub use engine::{
    Command, EngineHandle, EngineSettings, FlushOutcome, SessionEngine, SessionSnapshot,
};
pub use error::{BoothError, Result};
pub use packager::{package, PackagingError};
pub use replay::{discover_batches, ReplayEngine, ReplayReport};
pub use session::{Destinations, Session};
pub use timer::IdleTimer;
pub use types::{DeliveryMethod, DeliveryOutcome, Recipient, SessionMode, StatusEvent};
pub use utils::SettlePolicy;
pub use watcher::{DirectoryWatcher, WatchEvent, WatcherError};
