//! Username and app-password SMTP transport.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

use super::message::load_message;
use super::{DeliveryError, DeliveryGateway};
use crate::config::SmtpConfig;
use crate::types::{DeliveryMethod, Recipient};

/// Port that speaks TLS from the first byte; every other port uses STARTTLS.
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends archives through an authenticated SMTP relay.
pub struct SmtpGateway {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    port: u16,
    from: String,
}

impl SmtpGateway {
    /// Builds a transport for `config`. No connection is opened until the
    /// first send.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Smtp`] if the relay cannot be set up for the
    /// host.
    pub fn new(config: &SmtpConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let mailer = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.as_str().to_owned(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            mailer,
            host: config.host.clone(),
            port: config.port,
            from: config.from.clone(),
        })
    }
}

impl fmt::Debug for SmtpGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpGateway")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Smtp
    }

    async fn send(
        &self,
        recipient: &Recipient,
        archive: &Path,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let message = load_message(&self.from, recipient, archive, subject, body).await?;
        let response = self.mailer.send(message).await?;
        debug!(
            host = %self.host,
            code = %response.code(),
            "SMTP relay accepted message"
        );
        Ok(())
    }
}
