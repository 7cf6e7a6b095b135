//! Domain records produced by derivation: completed laps, pit stops, and
//! the corrected lap counter.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A completed-lap record, synthesized from a `TimingData` delta.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapRecord {
    pub driver_number: i64,
    pub lap_number: u32,
    pub lap_duration: f64,
    pub duration_sector_1: Option<f64>,
    pub duration_sector_2: Option<f64>,
    pub duration_sector_3: Option<f64>,
    pub i1_speed: Option<String>,
    pub i2_speed: Option<String>,
    pub st_speed: Option<String>,
    pub is_pit_out_lap: bool,
    /// `frame_timestamp - lap_duration`, when the frame timestamp was present
    /// and parseable.
    pub date_start: Option<DateTime<Utc>>,
    pub session_key: Option<String>,
    pub meeting_key: Option<String>,
}

/// A completed pit-stop record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitRecord {
    pub driver_number: i64,
    pub lap_number: u32,
    /// Seconds, rounded to 2 decimal places.
    pub pit_duration: f64,
    pub date: DateTime<Utc>,
    pub session_key: Option<String>,
    pub meeting_key: Option<String>,
}

/// Ephemeral bookkeeping for a driver currently in the pits (no matching
/// `PitOut` seen yet).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PitEntry {
    pub entry_time: DateTime<Utc>,
    pub lap_number: u32,
}

/// The store's derived `LapCount` slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LapCount {
    pub current_lap: u32,
    pub total_laps: u32,
}

impl Default for LapCount {
    fn default() -> Self {
        LapCount {
            current_lap: 1,
            total_laps: 0,
        }
    }
}
