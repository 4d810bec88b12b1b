//! Slack webhook notification sink.
//!
//! Formats `NotificationEvent`s as Slack attachment payloads and posts
//! them to the configured webhook. Delivery failure is logged, never
//! fatal: a backup that succeeded stays succeeded even if Slack is down.

use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;

use dbkeep_core::{EventKind, NotificationEvent};

use crate::config::SlackSettings;

pub(crate) struct SlackNotifier {
    webhook_url: Option<String>,
}

impl SlackNotifier {
    pub(crate) fn new(settings: &SlackSettings) -> Self {
        let webhook_url = if settings.enabled {
            if settings.webhook_url.is_none() {
                tracing::warn!("slack notifications enabled but no webhook_url configured");
            }
            settings.webhook_url.clone()
        } else {
            None
        };
        SlackNotifier { webhook_url }
    }

    pub(crate) fn send(&self, event: &NotificationEvent) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let payload = attachment_payload(event);
        let agent = ureq::Agent::new_with_defaults();
        match agent
            .post(url)
            .header("Content-Type", "application/json")
            .send_json(&payload)
        {
            Ok(_) => tracing::debug!(kind = ?event.kind, "slack notification delivered"),
            Err(e) => tracing::warn!(kind = ?event.kind, "slack delivery failed: {e}"),
        }
    }
}

fn attachment_payload(event: &NotificationEvent) -> Value {
    let (color, title) = match event.kind {
        EventKind::BackupSucceeded => ("good", "Backup Completed Successfully"),
        EventKind::BackupFailed => ("danger", "Backup Failed"),
        EventKind::VerificationFailed => ("danger", "Backup Verification Failed"),
        EventKind::CleanupSummary => ("#439FE0", "Retention Cleanup Summary"),
    };
    let timestamp = event
        .timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| event.timestamp.to_string());
    json!({
        "attachments": [{
            "color": color,
            "title": title,
            "fields": [
                { "title": "Database", "value": event.database_name, "short": true },
                { "title": "Time", "value": timestamp, "short": true },
                { "title": "Detail", "value": event.message, "short": false },
            ],
            "footer": "dbkeep",
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn failure_events_are_red() {
        let event = NotificationEvent::new(
            EventKind::BackupFailed,
            "orders",
            datetime!(2026-01-10 03:00 UTC),
            "pg_dump failed: connection refused",
        );
        let payload = attachment_payload(&event);
        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], "danger");
        assert_eq!(attachment["fields"][0]["value"], "orders");
        assert_eq!(attachment["fields"][1]["value"], "2026-01-10T03:00:00Z");
    }

    #[test]
    fn disabled_notifier_never_posts() {
        let notifier = SlackNotifier::new(&SlackSettings {
            enabled: false,
            webhook_url: Some("https://hooks.slack.example/T000".to_string()),
        });
        assert!(notifier.webhook_url.is_none());
    }
}
