//! Token-authenticated mail API transport.
//!
//! The message is built exactly as for SMTP, then posted as
//! `{"raw": "<base64url RFC 822 message>"}` with a bearer token. A send only
//! counts as delivered when the API answers 2xx with a non-empty message
//! `id`. Obtaining or refreshing the token is left to whoever configures it.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use zeroize::Zeroizing;

use super::message::load_message;
use super::{DeliveryError, DeliveryGateway};
use crate::config::ApiConfig;
use crate::types::{DeliveryMethod, Recipient};

#[derive(Serialize)]
struct SendRequest {
    raw: String,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Sends archives through the mail API.
pub struct ApiGateway {
    client: Client,
    url: String,
    token: Zeroizing<String>,
    from: String,
}

impl ApiGateway {
    /// # Errors
    ///
    /// Returns [`DeliveryError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            token: config.token.clone(),
            from: config.from.clone(),
        })
    }
}

impl fmt::Debug for ApiGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiGateway")
            .field("url", &self.url)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DeliveryGateway for ApiGateway {
    fn method(&self) -> DeliveryMethod {
        DeliveryMethod::Api
    }

    async fn send(
        &self,
        recipient: &Recipient,
        archive: &Path,
        subject: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let message = load_message(&self.from, recipient, archive, subject, body).await?;
        let request = SendRequest {
            raw: URL_SAFE.encode(message.formatted()),
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.token.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            error!("Mail API rejected the access token");
            return Err(DeliveryError::AuthFailed);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let reply: SendResponse = response
            .json()
            .await
            .map_err(|err| DeliveryError::InvalidResponse(err.to_string()))?;
        match reply.id {
            Some(id) if !id.is_empty() => {
                debug!(message_id = %id, "Mail API accepted message");
                Ok(())
            }
            _ => Err(DeliveryError::InvalidResponse(
                "response has no message id".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_token() {
        let gateway = ApiGateway::new(
            &ApiConfig {
                url: "http://localhost/send".into(),
                token: Zeroizing::new("secret-token".into()),
                from: "booth@example.com".into(),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{gateway:?}");
        assert!(debug.contains("http://localhost/send"));
        assert!(!debug.contains("secret-token"));
        assert_eq!(gateway.method(), DeliveryMethod::Api);
    }
}
