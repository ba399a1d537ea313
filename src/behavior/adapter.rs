//! Inbound signal adapter
//!
//! Parses event JSON from producers (scroll listener, mutation observer,
//! classifier callbacks) into validated [`Event`]s, and maps raw classifier
//! responses onto detection events. Stream parsers are lenient: a malformed
//! record is dropped and counted rather than failing the whole batch.

use crate::behavior::types::{DetectionCategory, Event};
use crate::error::PulseError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Label the nudity classifier returns for positive images
const NUDITY_LABEL: &str = "Nudity";

/// Label the brainrot classifier returns for positive frames
const BRAINROT_LABEL: &str = "Brainrot";

/// Events parsed from a stream, plus how many records were dropped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEvents {
    pub events: Vec<Event>,
    pub dropped: usize,
}

/// Parse and validate a single event
pub fn parse_event(json: &str) -> Result<Event, PulseError> {
    let event: Event = serde_json::from_str(json)
        .map_err(|e| PulseError::ParseError(format!("Failed to parse event: {}", e)))?;
    validate_event(&event)?;
    Ok(event)
}

/// Reject events whose values the aggregator cannot use
pub fn validate_event(event: &Event) -> Result<(), PulseError> {
    if event.timestamp().timestamp_millis() < 0 {
        return Err(PulseError::InvalidEvent(
            "timestamp must not precede the Unix epoch".to_string(),
        ));
    }

    match event {
        Event::Scroll { position, .. } if !position.is_finite() => Err(PulseError::InvalidEvent(
            format!("scroll position must be finite, got {position}"),
        )),
        Event::Detection { confidence, .. } if !(0.0..=1.0).contains(confidence) => Err(
            PulseError::InvalidEvent(format!("confidence must be within [0, 1], got {confidence}")),
        ),
        _ => Ok(()),
    }
}

/// Parse newline-delimited events, skipping blank lines and dropping bad records
pub fn parse_ndjson(input: &str) -> ParsedEvents {
    let mut parsed = ParsedEvents::default();

    for (line_no, line) in input.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_event(trimmed) {
            Ok(event) => parsed.events.push(event),
            Err(e) => {
                tracing::debug!(line = line_no + 1, error = %e, "dropping malformed event");
                parsed.dropped += 1;
            }
        }
    }

    parsed
}

/// Parse a JSON array of events; only the outer array must be well formed
pub fn parse_array(input: &str) -> Result<ParsedEvents, PulseError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(input)
        .map_err(|e| PulseError::ParseError(format!("Expected a JSON array of events: {}", e)))?;

    let mut parsed = ParsedEvents::default();
    for (index, value) in values.into_iter().enumerate() {
        let result = serde_json::from_value::<Event>(value)
            .map_err(PulseError::from)
            .and_then(|event| validate_event(&event).map(|()| event));
        match result {
            Ok(event) => parsed.events.push(event),
            Err(e) => {
                tracing::debug!(index, error = %e, "dropping malformed event");
                parsed.dropped += 1;
            }
        }
    }

    Ok(parsed)
}

#[derive(Debug, Deserialize)]
struct ViolenceResponse {
    #[serde(default)]
    is_violent: bool,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    #[serde(default)]
    label: String,
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DeepfakeResponse {
    #[serde(default)]
    is_deepfake: bool,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct EpilepsyResponse {
    #[serde(default)]
    is_epilepsy_trigger: bool,
    #[serde(default)]
    confidence: f64,
    status: Option<String>,
}

/// Map a classifier response body onto a detection event for `category`.
///
/// A flash analysis that is still `collecting` frames, or reported an
/// `error`, is a negative detection. Flash confidence is an energy ratio that
/// exceeds 1.0 whenever the trigger fires; it is clamped into [0, 1].
pub fn detection_from_response(
    category: DetectionCategory,
    body: &serde_json::Value,
    at: DateTime<Utc>,
) -> Result<Event, PulseError> {
    let (is_positive, confidence) = match category {
        DetectionCategory::Violence => {
            let r: ViolenceResponse = serde_json::from_value(body.clone())?;
            (r.is_violent, r.confidence)
        }
        DetectionCategory::Deepfake => {
            let r: DeepfakeResponse = serde_json::from_value(body.clone())?;
            (r.is_deepfake, r.confidence)
        }
        DetectionCategory::Nudity | DetectionCategory::Brainrot => {
            let r: LabelResponse = serde_json::from_value(body.clone())?;
            let expected = if category == DetectionCategory::Nudity {
                NUDITY_LABEL
            } else {
                BRAINROT_LABEL
            };
            let positive = r.label == expected;
            let fallback = if positive { 1.0 } else { 0.0 };
            (positive, r.confidence.unwrap_or(fallback))
        }
        DetectionCategory::Flash => {
            let r: EpilepsyResponse = serde_json::from_value(body.clone())?;
            match r.status.as_deref() {
                Some("collecting") | Some("error") => (false, 0.0),
                _ => (r.is_epilepsy_trigger, r.confidence.clamp(0.0, 1.0)),
            }
        }
    };

    let event = Event::Detection {
        category,
        is_positive,
        confidence,
        timestamp: at,
    };
    validate_event(&event)?;
    Ok(event)
}

/// Map the violence endpoint's `{is_violent, confidence}` response
pub fn violence_response_to_event(
    body: &serde_json::Value,
    at: DateTime<Utc>,
) -> Result<Event, PulseError> {
    detection_from_response(DetectionCategory::Violence, body, at)
}
