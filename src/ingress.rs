//! Frame dispatch: decode SignalR frames, drive `Store` mutations, and
//! broadcast the resulting envelopes to subscribers.

use crate::egress::SubscriberRegistry;
use chrono::{DateTime, Utc};
use relay_core::{decode, strip_compressed_suffix, Payload, Store};
use relay_core::store::{MergeFeed, ReplaceFeed};
use relay_protocol::{Envelope, FeedUpdate, SignalRFrame};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("frame was not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a feed name maps onto the store's fixed slot table.
enum FeedRoute {
    Merge(MergeFeed),
    Replace(ReplaceFeed),
    RaceControlMessages,
    TeamRadio,
    TimingData,
    SessionInfo,
    LapCountDiscard,
    /// Subscribed feeds with no store slot (Heartbeat, ExtrapolatedClock,
    /// RcmSeries, SessionData) — present on the wire, absent from §3.
    Unrouted,
}

fn route(feed_name: &str) -> FeedRoute {
    match feed_name {
        "DriverList" => FeedRoute::Merge(MergeFeed::DriverList),
        "TimingAppData" => FeedRoute::Merge(MergeFeed::TimingAppData),
        "TimingStats" => FeedRoute::Merge(MergeFeed::TimingStats),
        "TopThree" => FeedRoute::Merge(MergeFeed::TopThree),
        "WeatherData" => FeedRoute::Replace(ReplaceFeed::WeatherData),
        "TrackStatus" => FeedRoute::Replace(ReplaceFeed::TrackStatus),
        "SessionStatus" => FeedRoute::Replace(ReplaceFeed::SessionStatus),
        "CarData" => FeedRoute::Replace(ReplaceFeed::CarData),
        "Position" => FeedRoute::Replace(ReplaceFeed::Position),
        "RaceControlMessages" => FeedRoute::RaceControlMessages,
        "TeamRadio" => FeedRoute::TeamRadio,
        "TimingData" => FeedRoute::TimingData,
        "SessionInfo" => FeedRoute::SessionInfo,
        "LapCount" => FeedRoute::LapCountDiscard,
        _ => FeedRoute::Unrouted,
    }
}

pub struct Ingress {
    store: Arc<Store>,
    subscribers: SubscriberRegistry,
}

impl Ingress {
    #[must_use]
    pub fn new(store: Arc<Store>, subscribers: SubscriberRegistry) -> Self {
        Ingress { store, subscribers }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn broadcast(&self, kind: impl Into<String>, data: Value) {
        self.subscribers.broadcast(Envelope::new(kind, data)).await;
    }

    /// Handle one upstream text frame (live WS, or a `"text"` replay line).
    pub async fn handle_text_frame(&self, raw: &str, arrival: DateTime<Utc>) -> Result<(), IngressError> {
        let frame: SignalRFrame = serde_json::from_str(raw)?;
        match frame {
            SignalRFrame::Snapshot { r } => self.handle_snapshot(r).await,
            SignalRFrame::Incremental { m } => self.handle_incremental(m, arrival).await,
        }
        Ok(())
    }

    /// Handle one upstream binary frame: decode via the Codec and route to
    /// `CarData` by the upstream's binary-frame convention.
    pub async fn handle_binary_frame(&self, bytes: &[u8], _arrival: DateTime<Utc>) {
        match decode(Payload::Bytes(bytes)) {
            Some(value) => {
                self.store.apply_replace(ReplaceFeed::CarData, value.clone()).await;
                self.broadcast("CarData", value).await;
            }
            None => warn!("binary frame failed to decode; dropped"),
        }
    }

    async fn handle_snapshot(&self, r: serde_json::Map<String, Value>) {
        for (feed_name, raw_payload) in r {
            let (effective_name, compressed) = strip_compressed_suffix(&feed_name);
            let payload = if compressed {
                match decode(Payload::Text(raw_payload.as_str().unwrap_or_default())) {
                    Some(v) => v,
                    None => {
                        warn!(feed = effective_name, "compressed snapshot feed failed to decode");
                        continue;
                    }
                }
            } else {
                raw_payload
            };

            if effective_name == "SessionInfo" {
                self.store.set_total_laps_from_session_info(&payload).await;
            }
            if effective_name == "LapCount" {
                continue;
            }
            self.apply_to_slot(effective_name, payload).await;
        }

        let full_state = self.store.snapshot().await;
        self.broadcast("Snapshot", full_state).await;
    }

    async fn handle_incremental(&self, updates: Vec<FeedUpdate>, arrival: DateTime<Utc>) {
        for update in updates {
            let Some(feed_name) = update.feed_name() else {
                continue;
            };
            let Some(payload) = update.payload() else {
                continue;
            };
            self.dispatch_update(feed_name, payload.clone(), arrival).await;
        }
    }

    async fn dispatch_update(&self, feed_name: &str, payload: Value, arrival: DateTime<Utc>) {
        match route(feed_name) {
            FeedRoute::TimingData => {
                let outcome = self.store.apply_timing_data(payload.clone(), arrival).await;
                self.broadcast("LapCount", serde_json::to_value(outcome.lap_count).unwrap_or(Value::Null))
                    .await;
                for pit in &outcome.new_pits {
                    self.broadcast("NewPitStop", serde_json::to_value(pit).unwrap_or(Value::Null))
                        .await;
                }
                for lap in &outcome.new_laps {
                    self.broadcast("NewLap", serde_json::to_value(lap).unwrap_or(Value::Null))
                        .await;
                }
                self.broadcast("TimingData", payload).await;
            }
            FeedRoute::SessionInfo => {
                self.store.set_total_laps_from_session_info(&payload).await;
                self.store.apply_replace(ReplaceFeed::SessionInfo, payload.clone()).await;
                self.broadcast("SessionInfo", payload).await;
            }
            FeedRoute::LapCountDiscard => {
                debug!("discarding upstream LapCount frame (known-bad feed)");
            }
            FeedRoute::Merge(feed) => {
                // store.rs logs and drops malformed payloads itself.
                if self.store.apply_merge(feed, payload.clone()).await.is_ok()
                    && feed_name == "TimingAppData"
                {
                    self.broadcast(feed_name, payload).await;
                }
            }
            FeedRoute::Replace(feed) => {
                self.store.apply_replace(feed, payload.clone()).await;
                if matches!(feed_name, "SessionStatus" | "WeatherData") {
                    self.broadcast(feed_name, payload).await;
                }
            }
            FeedRoute::RaceControlMessages => {
                self.store.apply_race_control_messages(payload.clone()).await;
                self.broadcast("RaceControlMessages", payload).await;
            }
            FeedRoute::TeamRadio => {
                let accepted = self.store.apply_team_radio(payload.clone()).await;
                self.broadcast("TeamRadio", payload).await;
                for capture in accepted {
                    self.broadcast("NewTeamRadio", capture).await;
                }
            }
            FeedRoute::Unrouted => {
                debug!(feed = feed_name, "feed has no store slot; ignored");
            }
        }
    }

    async fn apply_to_slot(&self, feed_name: &str, payload: Value) {
        match route(feed_name) {
            FeedRoute::Merge(feed) => {
                // store.rs logs and drops malformed payloads itself.
                let _ = self.store.apply_merge(feed, payload).await;
            }
            FeedRoute::Replace(feed) => self.store.apply_replace(feed, payload).await,
            FeedRoute::SessionInfo => self.store.apply_replace(ReplaceFeed::SessionInfo, payload).await,
            FeedRoute::RaceControlMessages => {
                self.store.apply_race_control_messages(payload).await;
            }
            FeedRoute::TeamRadio => {
                self.store.apply_team_radio(payload).await;
            }
            FeedRoute::TimingData => {
                // Snapshot payloads reflect state already recorded before the
                // frame arrived; merge only, never re-run lap/pit derivation
                // or recompute CurrentLap against it.
                self.store.merge_timing_data(payload).await;
            }
            FeedRoute::LapCountDiscard | FeedRoute::Unrouted => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    fn new_ingress() -> Ingress {
        Ingress::new(Arc::new(Store::new()), SubscriberRegistry::new())
    }

    fn deflate_raw_base64(tree: &Value) -> String {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(tree.to_string().as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        base64::engine::general_purpose::STANDARD.encode(compressed)
    }

    #[tokio::test]
    async fn single_lap_race_scenario() {
        let ingress = new_ingress();
        ingress
            .dispatch_update(
                "SessionInfo",
                json!({"Key": "s1", "Meeting": {"Key": "m1", "Circuit": {"ShortName": "Monte Carlo"}}}),
                Utc::now(),
            )
            .await;

        let outcome_frame = json!({
            "Lines": {
                "44": {
                    "NumberOfLaps": 1,
                    "LastLapTime": {"Value": "1:14.260"},
                    "Sectors": {"0": {"Value": "24.100"}, "1": {"Value": "27.160"}, "2": {"Value": "23.000"}},
                }
            }
        });
        ingress.dispatch_update("TimingData", outcome_frame, Utc::now()).await;

        let lap_count = ingress.store.lap_count().await;
        assert_eq!(lap_count.current_lap, 2);
        assert_eq!(lap_count.total_laps, 78);
        assert_eq!(ingress.store.lap_history_len().await, 1);
    }

    #[tokio::test]
    async fn compressed_snapshot_decodes_car_data() {
        let ingress = new_ingress();
        let tree = json!({"Entries": [{"X": 1}]});
        let encoded = deflate_raw_base64(&tree);

        let mut snapshot = serde_json::Map::new();
        snapshot.insert("CarData.z".to_owned(), Value::String(encoded));
        ingress.handle_snapshot(snapshot).await;

        let snap = ingress.store.snapshot().await;
        assert_eq!(snap["CarData"], tree);
    }

    #[tokio::test]
    async fn pit_stop_scenario_drains_drivers_in_pits() {
        let ingress = new_ingress();
        let t0 = Utc::now();
        ingress
            .dispatch_update("TimingData", json!({"Lines": {"16": {"InPit": true}}}), t0)
            .await;
        let t1 = t0 + chrono::Duration::milliseconds(24_370);
        ingress
            .dispatch_update("TimingData", json!({"Lines": {"16": {"PitOut": true}}}), t1)
            .await;

        assert!(ingress.store.drivers_in_pits_is_empty().await);
        assert_eq!(ingress.store.pit_history_len().await, 1);
    }

    #[tokio::test]
    async fn upstream_lap_count_frame_is_discarded() {
        let ingress = new_ingress();
        ingress
            .dispatch_update(
                "SessionInfo",
                json!({"Meeting": {"Circuit": {"ShortName": "Silverstone"}}}),
                Utc::now(),
            )
            .await;
        ingress
            .dispatch_update("LapCount", json!({"CurrentLap": 999, "TotalLaps": 7}), Utc::now())
            .await;

        let lap_count = ingress.store.lap_count().await;
        assert_eq!(lap_count.current_lap, 1);
        assert_eq!(lap_count.total_laps, 52);
    }

    #[tokio::test]
    async fn snapshot_timing_data_does_not_duplicate_lap_history() {
        let ingress = new_ingress();
        // A driver already completed lap 1 before the reconnect that
        // triggers this snapshot.
        ingress
            .dispatch_update(
                "TimingData",
                json!({
                    "Lines": {
                        "44": {
                            "NumberOfLaps": 1,
                            "LastLapTime": {"Value": "1:14.260"},
                            "Sectors": {"0": {"Value": "24.100"}, "1": {"Value": "27.160"}, "2": {"Value": "23.000"}},
                        }
                    }
                }),
                Utc::now(),
            )
            .await;
        assert_eq!(ingress.store.lap_history_len().await, 1);

        // The resent snapshot on reconnect carries the same last-known
        // TimingData for every driver; it must not re-trigger derivation.
        let mut snapshot = serde_json::Map::new();
        snapshot.insert(
            "TimingData".to_owned(),
            json!({
                "Lines": {
                    "44": {
                        "NumberOfLaps": 1,
                        "LastLapTime": {"Value": "1:14.260"},
                        "Sectors": {"0": {"Value": "24.100"}, "1": {"Value": "27.160"}, "2": {"Value": "23.000"}},
                    }
                }
            }),
        );
        ingress.handle_snapshot(snapshot).await;

        assert_eq!(ingress.store.lap_history_len().await, 1);
        assert_eq!(ingress.store.lap_count().await.current_lap, 2);
    }

    #[tokio::test]
    async fn snapshot_to_new_subscriber_carries_full_state() {
        let ingress = new_ingress();
        ingress
            .dispatch_update(
                "DriverList",
                json!({"44": {"Tla": "VER"}, "16": {"Tla": "LEC"}}),
                Utc::now(),
            )
            .await;
        for i in 0..5 {
            ingress
                .dispatch_update(
                    "RaceControlMessages",
                    json!({"Messages": [{"Utc": format!("t{i}"), "Category": "Flag", "Message": "m"}]}),
                    Utc::now(),
                )
                .await;
        }

        let (_id, mut rx) = ingress.subscribers.register().await;
        let full_state = ingress.store.snapshot().await;
        rx.close();
        assert_eq!(full_state["DriverList"].as_object().unwrap().len(), 2);
        assert_eq!(full_state["RaceControlMessages"].as_array().unwrap().len(), 5);
    }
}
