use serde::Serialize;
use time::OffsetDateTime;

/// What happened, for the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BackupSucceeded,
    BackupFailed,
    VerificationFailed,
    CleanupSummary,
}

/// A structured notification event. The core only produces these;
/// delivery (Slack webhook, etc.) is the sink's concern.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub kind: EventKind,
    pub database_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
}

impl NotificationEvent {
    pub fn new(
        kind: EventKind,
        database_name: impl Into<String>,
        timestamp: OffsetDateTime,
        message: impl Into<String>,
    ) -> Self {
        NotificationEvent {
            kind,
            database_name: database_name.into(),
            timestamp,
            message: message.into(),
        }
    }
}
