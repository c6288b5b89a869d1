//! MIME message assembly shared by both transports.

use std::path::Path;

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;

use super::DeliveryError;
use crate::types::Recipient;

const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Builds a multipart/mixed message with a plain-text body and the archive
/// attached under `archive_name`.
///
/// # Errors
///
/// Returns [`DeliveryError::Address`] for an invalid sender or recipient, and
/// [`DeliveryError::Message`] if the message cannot be assembled.
pub fn build_message(
    from: &str,
    recipient: &Recipient,
    archive_name: &str,
    archive_bytes: Vec<u8>,
    subject: &str,
    body: &str,
) -> Result<Message, DeliveryError> {
    let from: Mailbox = from.parse()?;
    let to: Mailbox = recipient.as_str().parse()?;
    let content_type = ContentType::parse(ZIP_CONTENT_TYPE)
        .map_err(|err| DeliveryError::Message(err.to_string()))?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(body.to_string()))
                .singlepart(
                    Attachment::new(archive_name.to_string()).body(archive_bytes, content_type),
                ),
        )
        .map_err(|err| DeliveryError::Message(err.to_string()))
}

/// Reads `archive` and builds the message for it.
///
/// # Errors
///
/// Returns [`DeliveryError::Io`] if the archive cannot be read, or the errors
/// of [`build_message`].
pub async fn load_message(
    from: &str,
    recipient: &Recipient,
    archive: &Path,
    subject: &str,
    body: &str,
) -> Result<Message, DeliveryError> {
    let bytes = tokio::fs::read(archive)
        .await
        .map_err(|source| DeliveryError::Io {
            path: archive.to_path_buf(),
            source,
        })?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "photos.zip".to_string());
    build_message(from, recipient, &name, bytes, subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).into_owned()
    }

    #[test]
    fn message_carries_body_and_zip_attachment() {
        let recipient = Recipient::parse("alice@x.com").unwrap();
        let message = build_message(
            "booth@example.com",
            &recipient,
            "photos_alice_20261014_101500.zip",
            b"PK\x03\x04".to_vec(),
            "Your Photo Booth Pictures!",
            "Thanks!",
        )
        .unwrap();

        let text = formatted(&message);
        assert!(text.contains("To: alice@x.com"));
        assert!(text.contains("Subject: Your Photo Booth Pictures!"));
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("Content-Type: application/zip"));
        assert!(text.contains("filename=\"photos_alice_20261014_101500.zip\""));
        assert!(text.contains("Thanks!"));
    }

    #[test]
    fn bad_sender_is_an_address_error() {
        let recipient = Recipient::parse("alice@x.com").unwrap();
        let err = build_message("not an address", &recipient, "a.zip", Vec::new(), "s", "b")
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Address(_)));
    }

    #[tokio::test]
    async fn missing_archive_is_io_error() {
        let recipient = Recipient::parse("alice@x.com").unwrap();
        let err = load_message(
            "booth@example.com",
            &recipient,
            Path::new("/nonexistent/photos.zip"),
            "s",
            "b",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeliveryError::Io { .. }));
    }
}
