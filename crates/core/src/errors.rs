use thiserror::Error;

/// Violations of the email/attachment data model, raised at ingestion time.
///
/// Step failures during plan execution are deliberately not errors: they are
/// recorded as `success = false` result maps so later steps can observe them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("attachment `{0}` must carry exactly one of inline content or a storage file id")]
    AttachmentStorage(String),
    #[error("email message has no id")]
    MissingMessageId,
}
