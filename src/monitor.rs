//! Activity logging to the monitoring backend

use crate::behavior::encoder::ActivityLog;
use crate::behavior::types::Pattern;
use crate::config::EndpointSettings;
use crate::error::RemoteError;
use tokio::task::JoinHandle;

/// Path of the monitoring backend's activity endpoint
const LOG_ACTIVITY_PATH: &str = "/monitoring/log-activity/";

/// Fire-and-forget reporter of pattern changes
#[derive(Debug, Clone)]
pub struct ActivityLogger {
    client: reqwest::Client,
    url: String,
    child_id: u64,
}

impl ActivityLogger {
    pub fn new(
        monitor_url: &str,
        child_id: u64,
        timeout: std::time::Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{}", monitor_url.trim_end_matches('/'), LOG_ACTIVITY_PATH),
            child_id,
        })
    }

    /// Build a logger when a monitoring URL is configured
    pub fn from_settings(settings: &EndpointSettings) -> Result<Option<Self>, RemoteError> {
        settings
            .monitor_url
            .as_deref()
            .map(|url| {
                Self::new(
                    url,
                    settings.child_id,
                    std::time::Duration::from_secs(settings.request_timeout_secs),
                )
            })
            .transpose()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Report a pattern in the background.
    ///
    /// The returned handle may be dropped; failures are only logged.
    pub fn log(&self, pattern: &Pattern, page_url: Option<&str>) -> JoinHandle<()> {
        let entry = ActivityLog::from_pattern(pattern, self.child_id, page_url);
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&entry).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::trace!(risk_level = entry.risk_level, "activity logged");
                }
                Ok(response) => {
                    tracing::debug!(status = response.status().as_u16(), "activity log rejected");
                }
                Err(e) => tracing::debug!(error = %e, "activity log failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::types::{PatternKind, PatternStatus};
    use crate::test_support::{closed_endpoint, serve_once};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn bad_pattern() -> Pattern {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        Pattern {
            doomscroll_rate: 3.0,
            violence_rate: 0.0,
            avg_violence_score: 0.0,
            status: PatternStatus::Bad,
            kind: PatternKind::Current,
            window_id: Uuid::new_v4(),
            window_start: start,
            doomscroll_count: 6,
            violence_count: 0,
            detection_counts: BTreeMap::new(),
            timestamp: start + Duration::minutes(2),
        }
    }

    #[test]
    fn test_disabled_without_monitor_url() {
        let settings = EndpointSettings::default();
        assert!(ActivityLogger::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_endpoint_url() {
        let settings = EndpointSettings {
            monitor_url: Some("http://monitor.local/".to_string()),
            ..EndpointSettings::default()
        };
        let logger = ActivityLogger::from_settings(&settings).unwrap().unwrap();
        assert_eq!(logger.url(), "http://monitor.local/monitoring/log-activity/");
    }

    #[tokio::test]
    async fn test_posts_activity_log() {
        let (base_url, server) = serve_once(201, r#"{"ok": true}"#).await;
        let logger = ActivityLogger::new(&base_url, 7, std::time::Duration::from_secs(5)).unwrap();

        logger
            .log(&bad_pattern(), Some("https://video.example/feed"))
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /monitoring/log-activity/"));

        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let value: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(value["child_id"], 7);
        assert_eq!(value["activity_type"], "usage_pattern");
        assert_eq!(value["url"], "https://video.example/feed");
        assert_eq!(value["risk_level"], 2);
        assert_eq!(value["details"]["doomscroll_count"], 6);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_silent() {
        let base_url = closed_endpoint().await;
        let logger = ActivityLogger::new(&base_url, 1, std::time::Duration::from_secs(1)).unwrap();

        // Completes without panicking
        logger.log(&bad_pattern(), None).await.unwrap();
    }
}
