//! Delivery of session archives.
//!
//! The session engine only knows the [`DeliveryGateway`] capability: send one
//! archive to one recipient, succeed or fail as a unit. Two transports
//! implement it ([`smtp::SmtpGateway`] and [`api::ApiGateway`]), and
//! [`Transport`] picks one from configuration.
//!
//! [`attempt_delivery`] bounds a send with a timeout and folds every error into
//! [`DeliveryOutcome::Failed`]; delivery failures never propagate further.

pub mod api;
pub mod message;
pub mod smtp;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TransportConfig;
use crate::types::{DeliveryMethod, DeliveryOutcome, Recipient};

pub use api::ApiGateway;
pub use smtp::SmtpGateway;

/// Default subject line.
pub const DEFAULT_SUBJECT: &str = "Your Photo Booth Pictures!";

/// Default message body.
pub const DEFAULT_BODY: &str = "Thank you for using our photo booth!\n\n\
                                Your photos are attached to this email.\n\n\
                                Best regards,\nThe Photo Booth Team";

/// Errors raised by a transport.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The SMTP exchange failed.
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API rejected message: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The API refused the token (401).
    #[error("authentication failed: token rejected")]
    AuthFailed,

    /// The API answered 2xx without a usable body.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The message could not be assembled.
    #[error("message error: {0}")]
    Message(String),

    /// A sender or recipient address was not a valid mailbox.
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The archive could not be read.
    #[error("cannot read archive {}: {source}", .path.display())]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Subject and body sent with every archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub subject: String,
    pub body: String,
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self {
            subject: DEFAULT_SUBJECT.to_string(),
            body: DEFAULT_BODY.to_string(),
        }
    }
}

/// A way of getting an archive to a recipient.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Label recorded in batch metadata when this gateway fails.
    fn method(&self) -> DeliveryMethod;

    /// Sends `archive` as an attachment to `recipient`.
    async fn send(
        &self,
        recipient: &Recipient,
        archive: &Path,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError>;
}

/// One bounded delivery attempt.
///
/// Never returns an error: transport failures and timeouts both become
/// [`DeliveryOutcome::Failed`] with a human-readable reason.
pub async fn attempt_delivery<G>(
    gateway: &G,
    recipient: &Recipient,
    archive: &Path,
    template: &MessageTemplate,
    timeout: Duration,
) -> DeliveryOutcome
where
    G: DeliveryGateway + ?Sized,
{
    let send = gateway.send(recipient, archive, &template.subject, &template.body);
    match tokio::time::timeout(timeout, send).await {
        Ok(Ok(())) => {
            info!(
                recipient = %recipient,
                method = %gateway.method(),
                archive = %archive.display(),
                "Archive delivered"
            );
            DeliveryOutcome::Delivered
        }
        Ok(Err(err)) => {
            warn!(
                recipient = %recipient,
                method = %gateway.method(),
                error = %err,
                "Delivery failed"
            );
            DeliveryOutcome::Failed(err.to_string())
        }
        Err(_) => {
            warn!(
                recipient = %recipient,
                method = %gateway.method(),
                timeout_secs = timeout.as_secs(),
                "Delivery timed out"
            );
            DeliveryOutcome::Failed(format!(
                "delivery timed out after {}s",
                timeout.as_secs()
            ))
        }
    }
}

/// The configured transport.
#[derive(Debug)]
pub enum Transport {
    Smtp(SmtpGateway),
    Api(ApiGateway),
}

impl Transport {
    /// Builds the transport named by `config`. `request_timeout` bounds each
    /// network exchange.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the client cannot be constructed.
    pub fn from_config(
        config: &TransportConfig,
        request_timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        Ok(match config {
            TransportConfig::Smtp(smtp) => Self::Smtp(SmtpGateway::new(smtp, request_timeout)?),
            TransportConfig::Api(api) => Self::Api(ApiGateway::new(api, request_timeout)?),
        })
    }
}

#[async_trait]
impl DeliveryGateway for Transport {
    fn method(&self) -> DeliveryMethod {
        match self {
            Self::Smtp(gateway) => gateway.method(),
            Self::Api(gateway) => gateway.method(),
        }
    }

    async fn send(
        &self,
        recipient: &Recipient,
        archive: &Path,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        match self {
            Self::Smtp(gateway) => gateway.send(recipient, archive, subject, body).await,
            Self::Api(gateway) => gateway.send(recipient, archive, subject, body).await,
        }
    }
}
