//! Telegram notifications for task outcomes.
//!
//! Notification failures are logged but never propagated: a task that
//! persisted its data has succeeded even if the message did not go out.

use crate::store::batch::BatchResult;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Notifier {
    client: Client,
    credentials: Option<(String, String)>,
}

impl Notifier {
    /// Missing credentials disable notification entirely; tasks still
    /// run, they just report through logs only.
    pub fn new(bot_token: Option<String>, chat_id: Option<String>) -> Self {
        let credentials = match (bot_token, chat_id) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => {
                warn!("telegram credentials not set, notifications disabled");
                None
            }
        };
        Notifier {
            client: Client::new(),
            credentials,
        }
    }

    pub async fn notify_success(
        &self,
        task_name: &str,
        result: &BatchResult,
        duration: Duration,
        started_at: DateTime<Utc>,
    ) {
        let message = format!(
            "✅ *Task succeeded*\n\n\
             *Task*: `{task_name}`\n\
             *Started (UTC+8)*: `{}`\n\
             *Duration*: `{:.2}s`\n\
             *Result*: {} written, {} failed",
            local_start(started_at),
            duration.as_secs_f64(),
            result.success,
            result.failed,
        );
        self.send(&message).await;
    }

    pub async fn notify_failure(
        &self,
        task_name: &str,
        error: &anyhow::Error,
        duration: Duration,
        started_at: DateTime<Utc>,
    ) {
        let message = format!(
            "🚨 *Task failed*\n\n\
             *Task*: `{task_name}`\n\
             *Started (UTC+8)*: `{}`\n\
             *Duration*: `{:.2}s`\n\n\
             *Error*: `{error:#}`",
            local_start(started_at),
            duration.as_secs_f64(),
        );
        self.send(&message).await;
    }

    async fn send(&self, message: &str) {
        let Some((token, chat_id)) = &self.credentials else {
            return;
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let payload = json!({
            "chat_id": chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        let result = self
            .client
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        match result {
            Ok(_) => info!("telegram notification sent"),
            Err(e) => error!(error = %e, "telegram notification failed"),
        }
    }
}

fn local_start(started_at: DateTime<Utc>) -> String {
    started_at
        .with_timezone(&crate::extract::taipei())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_disable_sending() {
        let notifier = Notifier::new(Some("token".into()), None);
        assert!(notifier.credentials.is_none());

        let notifier = Notifier::new(Some("token".into()), Some("chat".into()));
        assert!(notifier.credentials.is_some());
    }

    #[test]
    fn test_start_time_rendered_in_taipei_time() {
        let started = "2025-06-01T06:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(local_start(started), "2025-06-01 14:00:00");
    }
}
