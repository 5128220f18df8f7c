use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Synthetic attachment name under which the full quoted email chain is
/// stored alongside the real attachments. Fallback planning skips it so the
/// reply thread is never parsed as a document.
pub const EMAIL_CHAIN_FILENAME: &str = "email_chain.md";

static ON_WROTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^On .{0,200}wrote:\s*$").unwrap());

/// A single inbound email. Field names follow the camelCase wire format used
/// by the ingestion side, so a captured message round-trips unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMessage {
    pub message_id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl EmailMessage {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.message_id.trim().is_empty() {
            return Err(DomainError::MissingMessageId);
        }
        for attachment in &self.attachments {
            attachment.validate()?;
        }
        Ok(())
    }

    /// The newest message in the thread: everything above the first quoted
    /// reply marker (`>` lines, `On ... wrote:`, Outlook and Gmail separator
    /// blocks).
    pub fn top_level_body(&self) -> String {
        top_level_body(&self.body)
    }
}

/// An email attachment. Carries either the raw bytes inline (`content`) or a
/// reference into blob storage (`file_id`), never both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "inline_content"
    )]
    pub content: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl Attachment {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.content.is_some() == self.file_id.is_some() {
            return Err(DomainError::AttachmentStorage(self.id.clone()));
        }
        Ok(())
    }

    /// Identifier a tool should use to fetch this attachment: the storage
    /// file id when the bytes have been uploaded, the attachment id
    /// otherwise.
    pub fn storage_id(&self) -> &str {
        self.file_id.as_deref().unwrap_or(&self.id)
    }

    /// True when `candidate` names this attachment by id, filename or
    /// storage file id.
    pub fn matches(&self, candidate: &str) -> bool {
        candidate == self.id || candidate == self.name || self.file_id.as_deref() == Some(candidate)
    }
}

/// Strips the quoted reply tail from an email body and returns the top-level
/// text with trailing whitespace removed.
pub fn top_level_body(body: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in body.lines() {
        if is_reply_marker(line.trim_start()) {
            break;
        }
        kept.push(line);
    }
    kept.join("\n").trim_end().to_string()
}

fn is_reply_marker(line: &str) -> bool {
    line.starts_with('>')
        || line.starts_with("-----Original Message-----")
        || line.starts_with("---------- Forwarded message")
        || ON_WROTE.is_match(line)
}

/// Inline attachment bytes travel as base64 strings on the wire.
mod inline_content {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::BASE64;
    use base64::Engine;

    pub fn serialize<S: Serializer>(
        content: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match content {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|text| BASE64.decode(text.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

/// Encodes attachment bytes for handing to a tool parameter.
pub fn encode_content(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_blank_message_id() {
        let mut email = email();
        email.message_id = "  ".to_string();
        assert!(matches!(
            email.validate(),
            Err(DomainError::MissingMessageId)
        ));
    }

    #[test]
    fn validate_rejects_attachment_with_both_content_and_file_id() {
        let mut email = email();
        email.attachments.push(Attachment {
            content: Some(b"raw".to_vec()),
            file_id: Some("file-9".to_string()),
            ..attachment("att-9", "double.pdf")
        });
        assert!(matches!(
            email.validate(),
            Err(DomainError::AttachmentStorage(id)) if id == "att-9"
        ));
    }

    #[test]
    fn validate_rejects_attachment_with_neither_storage_form() {
        let mut bare = attachment("att-2", "empty.txt");
        bare.file_id = None;
        assert!(bare.validate().is_err());
    }

    #[test]
    fn storage_id_prefers_file_id() {
        let stored = attachment("att-1", "invoice.pdf");
        assert_eq!(stored.storage_id(), "file-1");

        let inline = Attachment {
            content: Some(b"bytes".to_vec()),
            file_id: None,
            ..attachment("att-3", "notes.txt")
        };
        assert_eq!(inline.storage_id(), "att-3");
    }

    #[test]
    fn matches_by_id_name_and_file_id() {
        let stored = attachment("att-1", "invoice.pdf");
        assert!(stored.matches("att-1"));
        assert!(stored.matches("invoice.pdf"));
        assert!(stored.matches("file-1"));
        assert!(!stored.matches("other.pdf"));
    }

    #[test]
    fn top_level_body_stops_at_quoted_reply() {
        let body = "Please handle the invoice.\nThanks,\nDana\n\nOn Tue, 3 Jun 2025 at 09:12, Sam <sam@example.com> wrote:\n> earlier text";
        assert_eq!(
            top_level_body(body),
            "Please handle the invoice.\nThanks,\nDana"
        );
    }

    #[test]
    fn top_level_body_stops_at_outlook_separator() {
        let body = "New request here.\n-----Original Message-----\nFrom: someone";
        assert_eq!(top_level_body(body), "New request here.");
    }

    #[test]
    fn top_level_body_stops_at_angle_quotes() {
        let body = "Short answer: yes.\n> did you get my last mail?\n> it had the contract";
        assert_eq!(top_level_body(body), "Short answer: yes.");
    }

    #[test]
    fn top_level_body_keeps_unquoted_text_intact() {
        let body = "Line one.\nLine two.";
        assert_eq!(top_level_body(body), body);
    }

    #[test]
    fn inline_content_round_trips_as_base64() {
        let inline = Attachment {
            content: Some(vec![0x00, 0xff, 0x10]),
            file_id: None,
            ..attachment("att-7", "blob.bin")
        };
        let encoded = serde_json::to_value(&inline).expect("serialize attachment");
        assert_eq!(encoded["content"], serde_json::json!("AP8Q"));
        let decoded: Attachment = serde_json::from_value(encoded).expect("deserialize attachment");
        assert_eq!(decoded, inline);
    }

    #[test]
    fn email_wire_format_is_camel_case() {
        let value = serde_json::to_value(email()).expect("serialize email");
        assert!(value.get("messageId").is_some());
        assert!(value.get("receivedAt").is_some());
        assert_eq!(value["attachments"][0]["mimeType"], "application/pdf");
        assert_eq!(value["attachments"][0]["fileId"], "file-1");
    }

    fn attachment(id: &str, name: &str) -> Attachment {
        Attachment {
            id: id.to_string(),
            name: name.to_string(),
            mime_type: "application/pdf".to_string(),
            content: None,
            file_id: Some("file-1".to_string()),
        }
    }

    fn email() -> EmailMessage {
        EmailMessage {
            message_id: "msg-100".to_string(),
            from: "dana@example.com".to_string(),
            subject: "Invoice for June".to_string(),
            body: "Please process the attached invoice.".to_string(),
            received_at: "2025-06-03T09:12:00Z".parse().expect("timestamp"),
            attachments: vec![attachment("att-1", "invoice.pdf")],
        }
    }
}
