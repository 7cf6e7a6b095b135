//! relay-protocol: wire types for the upstream SignalR feed, the downstream
//! subscriber protocol, and the replay capture-file format.
//!
//! Upstream feed payloads are open-ended third-party JSON (see
//! `relay-core::store` for the typed/generic split), so most payload bodies
//! here are carried as `serde_json::Value` rather than fully modeled structs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Negotiate (HTTP)
// ---------------------------------------------------------------------------

/// Response body from the SignalR `/negotiate` endpoint.
///
/// Unknown fields (`ConnectionId`, `KeepAliveTimeout`, ...) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct NegotiateResponse {
    #[serde(rename = "ConnectionToken")]
    pub connection_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Subscribe (WebSocket, outbound)
// ---------------------------------------------------------------------------

/// The fixed feed subscription list, in subscribe-message order.
pub const SUBSCRIBED_FEEDS: &[&str] = &[
    "Heartbeat",
    "CarData.z",
    "Position.z",
    "ExtrapolatedClock",
    "TopThree",
    "RcmSeries",
    "TimingStats",
    "TimingAppData",
    "WeatherData",
    "TrackStatus",
    "SessionStatus",
    "DriverList",
    "RaceControlMessages",
    "SessionInfo",
    "SessionData",
    "LapCount",
    "TimingData",
    "TeamRadio",
];

/// The `Subscribe` hub-invocation message sent once after connecting.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeMessage {
    #[serde(rename = "H")]
    pub hub: String,
    #[serde(rename = "M")]
    pub method: String,
    #[serde(rename = "A")]
    pub args: Vec<Vec<String>>,
    #[serde(rename = "I")]
    pub invocation_id: u32,
}

impl SubscribeMessage {
    #[must_use]
    pub fn streaming() -> Self {
        SubscribeMessage {
            hub: "Streaming".to_owned(),
            method: "Subscribe".to_owned(),
            args: vec![SUBSCRIBED_FEEDS.iter().map(|s| (*s).to_owned()).collect()],
            invocation_id: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Incoming frames (WebSocket, inbound)
// ---------------------------------------------------------------------------

/// One `{"M": _, "A": [feedName, payload, ...]}` entry inside an incremental
/// frame's `M` array. Only the first two `A` elements are meaningful.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedUpdate {
    #[serde(rename = "A")]
    pub args: Vec<serde_json::Value>,
}

impl FeedUpdate {
    #[must_use]
    pub fn feed_name(&self) -> Option<&str> {
        self.args.first().and_then(serde_json::Value::as_str)
    }

    #[must_use]
    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.args.get(1)
    }
}

/// A decoded top-level SignalR text frame: either a full snapshot (`R`) or
/// a list of incremental updates (`M`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignalRFrame {
    Snapshot {
        #[serde(rename = "R")]
        r: serde_json::Map<String, serde_json::Value>,
    },
    Incremental {
        #[serde(rename = "M")]
        m: Vec<FeedUpdate>,
    },
}

// ---------------------------------------------------------------------------
// Downstream subscriber protocol
// ---------------------------------------------------------------------------

/// `{"type": "...", "data": ...}` envelope pushed to every streaming
/// subscriber after the initial full-state frame.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Envelope {
            kind: kind.into(),
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Replay capture file
// ---------------------------------------------------------------------------

/// One line of a capture file: `{"timestamp": ..., "type": "text"|"binary", "data": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureLine {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: CaptureKind,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Text,
    Binary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_message_serializes_fixed_feed_list_under_tagged_fields() {
        let msg = SubscribeMessage::streaming();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["H"], "Streaming");
        assert_eq!(json["M"], "Subscribe");
        assert_eq!(json["I"], 1);
        assert_eq!(json["A"][0][0], "Heartbeat");
        assert_eq!(json["A"][0].as_array().unwrap().len(), SUBSCRIBED_FEEDS.len());
    }

    #[test]
    fn signalr_frame_distinguishes_snapshot_from_incremental() {
        let snapshot: SignalRFrame = serde_json::from_str(r#"{"R":{"DriverList":{}}}"#).unwrap();
        assert!(matches!(snapshot, SignalRFrame::Snapshot { .. }));

        let incremental: SignalRFrame =
            serde_json::from_str(r#"{"M":[{"M":"x","A":["TimingData",{}]}]}"#).unwrap();
        match incremental {
            SignalRFrame::Incremental { m } => {
                assert_eq!(m.len(), 1);
                assert_eq!(m[0].feed_name(), Some("TimingData"));
            }
            SignalRFrame::Snapshot { .. } => panic!("expected incremental"),
        }
    }

    #[test]
    fn negotiate_response_ignores_unknown_fields() {
        let resp: NegotiateResponse =
            serde_json::from_str(r#"{"ConnectionToken":"abc","ConnectionId":"ignored"}"#).unwrap();
        assert_eq!(resp.connection_token.as_deref(), Some("abc"));
    }

    #[test]
    fn capture_line_parses_text_and_binary_kinds() {
        let line: CaptureLine = serde_json::from_str(
            r#"{"timestamp":"2026-01-01T00:00:00Z","type":"text","data":"{}"}"#,
        )
        .unwrap();
        assert_eq!(line.kind, CaptureKind::Text);

        let line: CaptureLine = serde_json::from_str(
            r#"{"timestamp":"2026-01-01T00:00:00Z","type":"binary","data":"AAA="}"#,
        )
        .unwrap();
        assert_eq!(line.kind, CaptureKind::Binary);
    }
}
