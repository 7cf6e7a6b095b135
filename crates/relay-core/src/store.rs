//! The authoritative in-memory projection of the upstream feed.
//!
//! Feed slots follow one of four update disciplines (merge / append /
//! replace / derived); see the module-level table in the project spec.
//! All mutation happens through `&self` methods serialized behind a single
//! `tokio::sync::RwLock` — the ingestion task is the sole writer, readers
//! (the serving task, `snapshot()` callers) take the read lock.

use crate::derive;
use crate::merge::merge;
use crate::models::{LapCount, LapRecord, PitEntry, PitRecord};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("merge payload for feed '{feed}' was not a JSON object; dropped")]
    NonObjectMergePayload { feed: String },
}

/// Feeds that follow the merge (deep-merge) update policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeFeed {
    DriverList,
    TimingAppData,
    TimingStats,
    TopThree,
}

/// Feeds that follow the replace (assign-wholesale) update policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceFeed {
    SessionInfo,
    WeatherData,
    TrackStatus,
    SessionStatus,
    CarData,
    Position,
}

/// Outcome of applying a `TimingData` delta: the feeds Ingress must
/// broadcast as a result.
#[derive(Debug, Clone, Default)]
pub struct TimingOutcome {
    pub lap_count: LapCount,
    pub new_laps: Vec<LapRecord>,
    pub new_pits: Vec<PitRecord>,
}

struct Inner {
    driver_list: Value,
    timing_data: Value,
    timing_app_data: Value,
    timing_stats: Value,
    top_three: Value,
    session_info: Value,
    weather_data: Value,
    track_status: Value,
    session_status: Value,
    car_data: Value,
    position: Value,
    race_control_messages: Vec<Value>,
    team_radio: Vec<Value>,
    lap_count: LapCount,
    lap_history: Vec<LapRecord>,
    pit_history: Vec<PitRecord>,
    drivers_in_pits: HashMap<String, PitEntry>,
    last_updated: HashMap<String, DateTime<Utc>>,
}

impl Inner {
    fn new() -> Self {
        let empty = || Value::Object(Map::new());
        Inner {
            driver_list: empty(),
            timing_data: empty(),
            timing_app_data: empty(),
            timing_stats: empty(),
            top_three: empty(),
            session_info: empty(),
            weather_data: empty(),
            track_status: empty(),
            session_status: empty(),
            car_data: empty(),
            position: empty(),
            race_control_messages: Vec::new(),
            team_radio: Vec::new(),
            lap_count: LapCount::default(),
            lap_history: Vec::new(),
            pit_history: Vec::new(),
            drivers_in_pits: HashMap::new(),
            last_updated: HashMap::new(),
        }
    }

    fn touch(&mut self, feed: &str) {
        self.last_updated.insert(feed.to_owned(), Utc::now());
    }

    fn session_key(&self) -> Option<String> {
        self.session_info
            .get("Key")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    fn meeting_key(&self) -> Option<String> {
        self.session_info
            .get("Meeting")?
            .get("Key")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

pub struct Store {
    inner: RwLock<Inner>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Store {
            inner: RwLock::new(Inner::new()),
        }
    }

    pub async fn apply_merge(&self, feed: MergeFeed, payload: Value) -> Result<(), StoreError> {
        if !payload.is_object() {
            let feed = format!("{feed:?}");
            warn!(feed, "dropped non-object merge payload");
            return Err(StoreError::NonObjectMergePayload { feed });
        }
        let mut inner = self.inner.write().await;
        let slot = match feed {
            MergeFeed::DriverList => &mut inner.driver_list,
            MergeFeed::TimingAppData => &mut inner.timing_app_data,
            MergeFeed::TimingStats => &mut inner.timing_stats,
            MergeFeed::TopThree => &mut inner.top_three,
        };
        merge(slot, &payload);
        inner.touch(&format!("{feed:?}"));
        Ok(())
    }

    pub async fn apply_replace(&self, feed: ReplaceFeed, payload: Value) {
        let mut inner = self.inner.write().await;
        let slot = match feed {
            ReplaceFeed::SessionInfo => &mut inner.session_info,
            ReplaceFeed::WeatherData => &mut inner.weather_data,
            ReplaceFeed::TrackStatus => &mut inner.track_status,
            ReplaceFeed::SessionStatus => &mut inner.session_status,
            ReplaceFeed::CarData => &mut inner.car_data,
            ReplaceFeed::Position => &mut inner.position,
        };
        *slot = payload;
        inner.touch(&format!("{feed:?}"));
    }

    /// Apply a `RaceControlMessages` payload: flatten `{Messages: [...]}` /
    /// `{Messages: {...}}` / a bare list / a bare object to individual
    /// messages, append only those carrying the `(Utc, Category, Message)`
    /// triple. Returns the messages actually appended, in arrival order.
    pub async fn apply_race_control_messages(&self, payload: Value) -> Vec<Value> {
        let candidates = flatten_feed_container(&payload, "Messages");
        let total = candidates.len();
        let accepted: Vec<Value> = candidates
            .into_iter()
            .filter(is_valid_race_control_message)
            .collect();
        if accepted.len() < total {
            warn!(dropped = total - accepted.len(), "skipped malformed race control messages");
        }
        if accepted.is_empty() {
            return accepted;
        }
        let mut inner = self.inner.write().await;
        inner.race_control_messages.extend(accepted.iter().cloned());
        inner.touch("RaceControlMessages");
        accepted
    }

    /// Apply a `TeamRadio` payload: flatten `{Captures: [...]}` / a bare
    /// list / a bare object, append as-is (no field validation). Returns
    /// the captures actually appended.
    pub async fn apply_team_radio(&self, payload: Value) -> Vec<Value> {
        let captures = flatten_feed_container(&payload, "Captures");
        if captures.is_empty() {
            return captures;
        }
        let mut inner = self.inner.write().await;
        inner.team_radio.extend(captures.iter().cloned());
        inner.touch("TeamRadio");
        captures
    }

    /// Extract `Meeting.Circuit.ShortName` from a `SessionInfo` payload and
    /// set `LapCount.TotalLaps` from the circuit table (0 if unknown or
    /// absent). Returns the resolved total.
    pub async fn set_total_laps_from_session_info(&self, payload: &Value) -> u32 {
        let short_name = payload
            .get("Meeting")
            .and_then(|m| m.get("Circuit"))
            .and_then(|c| c.get("ShortName"))
            .and_then(Value::as_str);
        let total = short_name.map_or(0, derive::circuit_total_laps);
        let mut inner = self.inner.write().await;
        inner.lap_count.total_laps = total;
        inner.touch("SessionInfo");
        total
    }

    /// Merge a `TimingData` payload into the store with no derivation side
    /// effects: no `CurrentLap` recompute, no lap/pit detection. Used for
    /// snapshot-frame ingestion, where the payload reflects state already
    /// recorded before the feed arrived and re-running derivation against it
    /// would duplicate lap/pit history entries.
    pub async fn merge_timing_data(&self, payload: Value) {
        if !payload.is_object() {
            return;
        }
        let mut inner = self.inner.write().await;
        merge(&mut inner.timing_data, &payload);
        inner.touch("TimingData");
    }

    /// Apply a `TimingData` delta: merge into the store, recompute
    /// `CurrentLap`, run the lap and pit detectors for every driver named in
    /// the delta, and append any resulting records to their histories.
    pub async fn apply_timing_data(&self, payload: Value, arrival: DateTime<Utc>) -> TimingOutcome {
        let mut outcome = TimingOutcome::default();
        if !payload.is_object() {
            return outcome;
        }

        let delta_lines: Vec<(String, Value)> = payload
            .get("Lines")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        let mut inner = self.inner.write().await;
        merge(&mut inner.timing_data, &payload);
        inner.touch("TimingData");

        let max_laps = inner
            .timing_data
            .get("Lines")
            .and_then(Value::as_object)
            .map(|lines| {
                lines
                    .values()
                    .filter_map(|line| line.get("NumberOfLaps").and_then(Value::as_u64))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        let current_lap = derive::current_lap(u32::try_from(max_laps).unwrap_or(u32::MAX));
        inner.lap_count.current_lap = current_lap;
        outcome.lap_count = inner.lap_count;

        let session_key = inner.session_key();
        let meeting_key = inner.meeting_key();

        for (driver_id, delta_line) in &delta_lines {
            let driver_number: i64 = driver_id.parse().unwrap_or_default();

            if let Some(merged_line) = inner
                .timing_data
                .get("Lines")
                .and_then(|l| l.get(driver_id))
            {
                if let Some(lap) = derive::detect_lap(
                    driver_number,
                    merged_line,
                    Some(arrival),
                    session_key.clone(),
                    meeting_key.clone(),
                ) {
                    inner.lap_history.push(lap.clone());
                    outcome.new_laps.push(lap);
                }
            }

            let in_pit = delta_line
                .get("InPit")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let pit_out = delta_line
                .get("PitOut")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            let already_tracked = inner.drivers_in_pits.contains_key(driver_id);
            let laps_completed = inner
                .timing_data
                .get("Lines")
                .and_then(|l| l.get(driver_id))
                .and_then(|l| l.get("NumberOfLaps"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if let Some(entry) = derive::pit_entry_on_in_pit(
                already_tracked,
                in_pit,
                arrival,
                u32::try_from(laps_completed).unwrap_or(u32::MAX),
            ) {
                inner.drivers_in_pits.insert(driver_id.clone(), entry);
            }

            if let Some(entry) = inner.drivers_in_pits.get(driver_id).cloned() {
                if let Some(pit) = derive::pit_record_on_pit_out(
                    &entry,
                    pit_out,
                    arrival,
                    driver_number,
                    session_key.clone(),
                    meeting_key.clone(),
                ) {
                    inner.drivers_in_pits.remove(driver_id);
                    inner.pit_history.push(pit.clone());
                    outcome.new_pits.push(pit);
                }
            }
        }

        outcome
    }

    pub async fn drivers_in_pits_is_empty(&self) -> bool {
        self.inner.read().await.drivers_in_pits.is_empty()
    }

    pub async fn lap_count(&self) -> LapCount {
        self.inner.read().await.lap_count
    }

    pub async fn lap_history_len(&self) -> usize {
        self.inner.read().await.lap_history.len()
    }

    pub async fn pit_history_len(&self) -> usize {
        self.inner.read().await.pit_history.len()
    }

    /// Diagnostics only: when a feed slot was last written. Never consulted
    /// for routing or dispatch decisions.
    pub async fn last_updated(&self, feed: &str) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_updated.get(feed).copied()
    }

    /// A deep-cloned, JSON-serializable view of the entire store, safe to
    /// serialize or hand to a new subscriber.
    pub async fn snapshot(&self) -> Value {
        let inner = self.inner.read().await;
        let drivers_in_pits: Map<String, Value> = inner
            .drivers_in_pits
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
            .collect();

        serde_json::json!({
            "DriverList": inner.driver_list,
            "TimingData": inner.timing_data,
            "TimingAppData": inner.timing_app_data,
            "TimingStats": inner.timing_stats,
            "TopThree": inner.top_three,
            "SessionInfo": inner.session_info,
            "WeatherData": inner.weather_data,
            "TrackStatus": inner.track_status,
            "SessionStatus": inner.session_status,
            "CarData": inner.car_data,
            "Position": inner.position,
            "RaceControlMessages": inner.race_control_messages,
            "TeamRadio": inner.team_radio,
            "LapCount": inner.lap_count,
            "LapHistory": inner.lap_history,
            "PitHistory": inner.pit_history,
            "DriversInPits": drivers_in_pits,
        })
    }
}

fn flatten_feed_container(payload: &Value, wrapper_key: &str) -> Vec<Value> {
    let unwrapped = match payload {
        Value::Object(map) => map.get(wrapper_key).cloned().unwrap_or_else(|| payload.clone()),
        other => other.clone(),
    };
    match unwrapped {
        Value::Array(items) => items,
        Value::Object(map) => map.into_values().collect(),
        other => vec![other],
    }
}

fn is_valid_race_control_message(msg: &Value) -> bool {
    msg.get("Utc").is_some() && msg.get("Category").is_some() && msg.get("Message").is_some()
}
