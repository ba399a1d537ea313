//! Remote classifier client
//!
//! Sends captured frames to the classification backend and turns its answers
//! into detection [`Event`]s. Call volume is bounded by [`DetectorGate`]: a
//! minimum spacing between analysis cycles plus a cooldown per detector. A
//! failed or slow call degrades to "no detection this cycle".

use crate::behavior::adapter::detection_from_response;
use crate::behavior::types::{DetectionCategory, Event};
use crate::config::EndpointSettings;
use crate::error::RemoteError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::task::JoinSet;

/// Minimum spacing between two analysis cycles
const MIN_CYCLE_SPACING_MS: i64 = 1_000;

/// Cooldown for the violence detector
const VIOLENCE_COOLDOWN_MS: i64 = 15_000;

/// Cooldown for every other detector
const DEFAULT_COOLDOWN_MS: i64 = 20_000;

/// HTTP client for the classification backend
#[derive(Debug, Clone)]
pub struct ClassifierClient {
    client: reqwest::Client,
    base_url: String,
}

impl ClassifierClient {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_settings(settings: &EndpointSettings) -> Result<Self, RemoteError> {
        Self::new(
            &settings.classifier_url,
            std::time::Duration::from_secs(settings.request_timeout_secs),
        )
    }

    /// Full endpoint URL for a detector
    pub fn endpoint(&self, category: DetectionCategory) -> String {
        format!("{}{}", self.base_url, endpoint_path(category))
    }

    /// Classify one JPEG frame
    pub async fn detect(
        &self,
        category: DetectionCategory,
        frame: &[u8],
        page_url: Option<&str>,
        captured_at: DateTime<Utc>,
    ) -> Result<Event, RemoteError> {
        let body = request_body(category, &encode_frame(frame), page_url);
        self.post(category, body, captured_at).await
    }

    async fn post(
        &self,
        category: DetectionCategory,
        body: serde_json::Value,
        captured_at: DateTime<Utc>,
    ) -> Result<Event, RemoteError> {
        let response = self
            .client
            .post(self.endpoint(category))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RemoteError::HttpStatus(response.status().as_u16()));
        }

        let value: serde_json::Value = response.json().await?;
        detection_from_response(category, &value, captured_at)
            .map_err(|e| RemoteError::BadResponse(e.to_string()))
    }
}

fn endpoint_path(category: DetectionCategory) -> &'static str {
    match category {
        DetectionCategory::Violence => "/video/violence/",
        DetectionCategory::Brainrot => "/video/brainrot/",
        DetectionCategory::Deepfake => "/video/deepfake/",
        DetectionCategory::Flash => "/video/epilepsy/",
        DetectionCategory::Nudity => "/image/classify_nudity/",
    }
}

/// Encode a JPEG frame the way a canvas data URL carries it
pub fn encode_frame(frame: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(frame))
}

fn request_body(
    category: DetectionCategory,
    data_url: &str,
    page_url: Option<&str>,
) -> serde_json::Value {
    match category {
        DetectionCategory::Deepfake => serde_json::json!({
            "video": data_url,
            "url": page_url.unwrap_or_default(),
        }),
        _ => serde_json::json!({ "image": data_url }),
    }
}

/// Rate limiter for classifier calls
#[derive(Debug, Clone)]
pub struct DetectorGate {
    min_spacing: Duration,
    cooldowns: HashMap<DetectionCategory, Duration>,
    last_cycle: Option<DateTime<Utc>>,
    last_call: HashMap<DetectionCategory, DateTime<Utc>>,
}

impl Default for DetectorGate {
    fn default() -> Self {
        let cooldowns = DetectionCategory::ALL
            .into_iter()
            .map(|category| {
                let ms = if category == DetectionCategory::Violence {
                    VIOLENCE_COOLDOWN_MS
                } else {
                    DEFAULT_COOLDOWN_MS
                };
                (category, Duration::milliseconds(ms))
            })
            .collect();

        Self {
            min_spacing: Duration::milliseconds(MIN_CYCLE_SPACING_MS),
            cooldowns,
            last_cycle: None,
            last_call: HashMap::new(),
        }
    }
}

impl DetectorGate {
    /// Open an analysis cycle at `now`; returns the detectors allowed to run.
    ///
    /// Returned detectors are marked as called whether or not the call later
    /// succeeds.
    pub fn open(
        &mut self,
        wanted: &[DetectionCategory],
        now: DateTime<Utc>,
    ) -> Vec<DetectionCategory> {
        if let Some(last) = self.last_cycle {
            if now - last < self.min_spacing {
                return Vec::new();
            }
        }

        let ready: Vec<DetectionCategory> = wanted
            .iter()
            .copied()
            .filter(|category| match self.last_call.get(category) {
                Some(last) => now - *last >= self.cooldown(*category),
                None => true,
            })
            .collect();

        if !ready.is_empty() {
            self.last_cycle = Some(now);
            for category in &ready {
                self.last_call.insert(*category, now);
            }
        }

        ready
    }

    fn cooldown(&self, category: DetectionCategory) -> Duration {
        self.cooldowns
            .get(&category)
            .copied()
            .unwrap_or_else(|| Duration::milliseconds(DEFAULT_COOLDOWN_MS))
    }
}

/// Runs every open detector against a captured frame
#[derive(Debug)]
pub struct FrameAnalyzer {
    client: ClassifierClient,
    gate: DetectorGate,
    categories: Vec<DetectionCategory>,
}

impl FrameAnalyzer {
    pub fn new(client: ClassifierClient) -> Self {
        Self::with_categories(client, DetectionCategory::ALL.to_vec())
    }

    pub fn with_categories(client: ClassifierClient, categories: Vec<DetectionCategory>) -> Self {
        Self {
            client,
            gate: DetectorGate::default(),
            categories,
        }
    }

    /// Query the open detectors concurrently.
    ///
    /// Detectors that fail are logged and contribute nothing this cycle.
    pub async fn analyze(
        &mut self,
        frame: &[u8],
        page_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        let ready = self.gate.open(&self.categories, now);
        if ready.is_empty() {
            return Vec::new();
        }

        let data_url = encode_frame(frame);
        let mut tasks = JoinSet::new();
        for category in ready {
            let client = self.client.clone();
            let body = request_body(category, &data_url, page_url);
            tasks.spawn(async move { (category, client.post(category, body, now).await) });
        }

        let mut events = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(event))) => events.push(event),
                Ok((category, Err(e))) => {
                    tracing::warn!(
                        %category,
                        error = %e,
                        "classifier call failed, treating as no detection"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "classifier task aborted"),
            }
        }
        events
    }
}
