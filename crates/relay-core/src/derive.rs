//! Pure derivation functions: lap completion, pit-stop transitions, the
//! corrected lap counter, and the circuit-to-total-laps lookup.
//!
//! Kept independent of `Store` and any socket so each is unit-testable in
//! isolation, per the coupling note in the design notes: lap detection, pit
//! detection, and lap-counter recomputation all fire from the same
//! `TimingData` delta but are otherwise unrelated pure transforms of
//! `(priorState, delta, arrivalTime)`.

use crate::clock::parse_lap_time;
use crate::models::{LapRecord, PitEntry, PitRecord};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;

/// Circuit short name → official race length, in laps. Unknown circuits
/// resolve to 0.
#[must_use]
pub fn circuit_total_laps(short_name: &str) -> u32 {
    const TABLE: &[(&str, u32)] = &[
        ("Monte Carlo", 78),
        ("Silverstone", 52),
        ("Spa-Francorchamps", 44),
        ("Monza", 53),
        ("Bahrain", 57),
        ("Jeddah", 50),
        ("Albert Park", 58),
        ("Imola", 63),
        ("Miami", 57),
        ("Catalunya", 66),
        ("Gilles-Villeneuve", 70),
        ("Red Bull Ring", 71),
        ("Hungaroring", 70),
        ("Zandvoort", 72),
        ("Marina Bay", 62),
        ("Suzuka", 53),
        ("COTA", 56),
        ("Mexico City", 71),
        ("Interlagos", 71),
        ("Las Vegas", 50),
        ("Losail", 57),
        ("Yas Marina", 58),
        ("Shanghai", 56),
        ("Baku", 51),
    ];
    TABLE
        .iter()
        .find(|(name, _)| *name == short_name)
        .map_or(0, |(_, laps)| *laps)
}

/// `CurrentLap = max(1, max_number_of_laps_over_drivers + 1)`.
#[must_use]
pub fn current_lap(max_number_of_laps: u32) -> u32 {
    (max_number_of_laps + 1).max(1)
}

/// Fetch `container[idx]` whether `container` is a JSON array or a
/// sparse numerically-keyed object (`{"0": ..., "1": ...}`) — upstream
/// sends both shapes for `Sectors`/`Stints` depending on feed revision.
fn indexed_get(container: &Value, idx: usize) -> Option<&Value> {
    match container {
        Value::Array(items) => items.get(idx),
        Value::Object(map) => map.get(&idx.to_string()),
        _ => None,
    }
}

fn sector_seconds(merged_line: &Value, idx: usize) -> Option<f64> {
    let sectors = merged_line.get("Sectors")?;
    let entry = indexed_get(sectors, idx)?;
    entry.get("Value")?.as_str().and_then(parse_lap_time)
}

fn speed_string(merged_line: &Value, key: &str) -> Option<String> {
    merged_line
        .get("Speeds")?
        .get(key)?
        .get("Value")?
        .as_str()
        .map(str::to_owned)
}

/// Detect a completed lap from a driver's post-merge `TimingData.Lines[d]`
/// view.
///
/// Returns `None` when `LastLapTime.Value` is absent/empty, unparseable, or
/// `NumberOfLaps` is absent or zero (an absent/zero lap count means the
/// event does not describe a completed lap).
#[must_use]
pub fn detect_lap(
    driver_number: i64,
    merged_line: &Value,
    frame_timestamp: Option<DateTime<Utc>>,
    session_key: Option<String>,
    meeting_key: Option<String>,
) -> Option<LapRecord> {
    let last_lap_time = merged_line.get("LastLapTime")?.get("Value")?.as_str()?;
    if last_lap_time.is_empty() {
        return None;
    }
    let lap_duration = parse_lap_time(last_lap_time)?;

    let lap_number = merged_line.get("NumberOfLaps")?.as_u64()?;
    if lap_number == 0 {
        return None;
    }
    let lap_number = u32::try_from(lap_number).unwrap_or(u32::MAX);

    let date_start = frame_timestamp.map(|ts| {
        let millis = (lap_duration * 1000.0).round() as i64;
        ts - ChronoDuration::milliseconds(millis)
    });

    Some(LapRecord {
        driver_number,
        lap_number,
        lap_duration,
        duration_sector_1: sector_seconds(merged_line, 0),
        duration_sector_2: sector_seconds(merged_line, 1),
        duration_sector_3: sector_seconds(merged_line, 2),
        i1_speed: speed_string(merged_line, "I1"),
        i2_speed: speed_string(merged_line, "I2"),
        st_speed: speed_string(merged_line, "ST"),
        is_pit_out_lap: merged_line
            .get("PitOut")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        date_start,
        session_key,
        meeting_key,
    })
}

/// Begin tracking a pit entry. No-op (returns `None`) if the driver is
/// already tracked or this delta doesn't carry `InPit=true` — a second
/// `InPit=true` while already tracked must not reset `entry_time`.
#[must_use]
pub fn pit_entry_on_in_pit(
    already_tracked: bool,
    in_pit: bool,
    now: DateTime<Utc>,
    laps_completed: u32,
) -> Option<PitEntry> {
    if in_pit && !already_tracked {
        Some(PitEntry {
            entry_time: now,
            lap_number: laps_completed + 1,
        })
    } else {
        None
    }
}

/// Complete a tracked pit entry into a pit record. Caller is responsible
/// for removing the entry from `DriversInPits` when this returns `Some`.
#[must_use]
pub fn pit_record_on_pit_out(
    entry: &PitEntry,
    pit_out: bool,
    now: DateTime<Utc>,
    driver_number: i64,
    session_key: Option<String>,
    meeting_key: Option<String>,
) -> Option<PitRecord> {
    if !pit_out {
        return None;
    }
    let duration_seconds = (now - entry.entry_time).num_milliseconds() as f64 / 1000.0;
    let rounded = (duration_seconds * 100.0).round() / 100.0;
    Some(PitRecord {
        driver_number,
        lap_number: entry.lap_number,
        pit_duration: rounded,
        date: now,
        session_key,
        meeting_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_lap_is_one_when_no_driver_has_completed_a_lap() {
        assert_eq!(current_lap(0), 1);
    }

    #[test]
    fn current_lap_is_max_plus_one() {
        assert_eq!(current_lap(5), 6);
    }

    #[test]
    fn circuit_lookup_defaults_to_zero_for_unknown_circuits() {
        assert_eq!(circuit_total_laps("Monte Carlo"), 78);
        assert_eq!(circuit_total_laps("Nowhereville"), 0);
    }

    #[test]
    fn detect_lap_builds_record_from_merged_line_with_list_form_sectors() {
        let line = json!({
            "NumberOfLaps": 1,
            "LastLapTime": {"Value": "1:14.260"},
            "Sectors": [{"Value": "24.100"}, {"Value": "27.160"}, {"Value": "23.000"}],
            "PitOut": false,
        });
        let ts = "2026-01-01T12:00:00Z".parse().unwrap();
        let rec = detect_lap(44, &line, Some(ts), Some("s1".into()), Some("m1".into())).unwrap();
        assert_eq!(rec.lap_number, 1);
        assert!((rec.lap_duration - 74.260).abs() < 1e-9);
        assert_eq!(rec.duration_sector_1, Some(24.100));
        assert_eq!(rec.duration_sector_2, Some(27.160));
        assert_eq!(rec.duration_sector_3, Some(23.000));
        assert!(!rec.is_pit_out_lap);
    }

    #[test]
    fn detect_lap_supports_sparse_map_form_sectors() {
        let line = json!({
            "NumberOfLaps": 2,
            "LastLapTime": {"Value": "59.999"},
            "Sectors": {"0": {"Value": "20.0"}, "2": {"Value": "19.999"}},
        });
        let rec = detect_lap(1, &line, None, None, None).unwrap();
        assert_eq!(rec.duration_sector_1, Some(20.0));
        assert_eq!(rec.duration_sector_2, None);
        assert_eq!(rec.duration_sector_3, Some(19.999));
        assert_eq!(rec.date_start, None);
    }

    #[test]
    fn detect_lap_skips_when_last_lap_time_missing_or_empty() {
        assert!(detect_lap(1, &json!({"NumberOfLaps": 1}), None, None, None).is_none());
        assert!(detect_lap(
            1,
            &json!({"NumberOfLaps": 1, "LastLapTime": {"Value": ""}}),
            None,
            None,
            None
        )
        .is_none());
    }

    #[test]
    fn detect_lap_skips_when_number_of_laps_absent_or_zero() {
        assert!(detect_lap(
            1,
            &json!({"LastLapTime": {"Value": "1:00.000"}}),
            None,
            None,
            None
        )
        .is_none());
        assert!(detect_lap(
            1,
            &json!({"NumberOfLaps": 0, "LastLapTime": {"Value": "1:00.000"}}),
            None,
            None,
            None
        )
        .is_none());
    }

    #[test]
    fn date_start_is_frame_timestamp_minus_duration() {
        let line = json!({"NumberOfLaps": 1, "LastLapTime": {"Value": "10.000"}});
        let ts: DateTime<Utc> = "2026-01-01T12:00:20Z".parse().unwrap();
        let rec = detect_lap(1, &line, Some(ts), None, None).unwrap();
        assert_eq!(rec.date_start.unwrap(), "2026-01-01T12:00:10Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn pit_entry_is_recorded_once_and_repeated_in_pit_is_a_no_op() {
        let now = Utc::now();
        let entry = pit_entry_on_in_pit(false, true, now, 3).unwrap();
        assert_eq!(entry.lap_number, 4);
        assert_eq!(entry.entry_time, now);

        // A second InPit=true while already tracked must not create a new entry.
        assert!(pit_entry_on_in_pit(true, true, now + ChronoDuration::seconds(5), 3).is_none());
    }

    #[test]
    fn pit_record_computes_duration_rounded_to_two_decimals() {
        let entry = PitEntry {
            entry_time: "2026-01-01T12:00:00.000Z".parse().unwrap(),
            lap_number: 5,
        };
        let exit = "2026-01-01T12:00:24.37Z".parse().unwrap();
        let rec = pit_record_on_pit_out(&entry, true, exit, 16, None, None).unwrap();
        assert_eq!(rec.pit_duration, 24.37);
        assert_eq!(rec.lap_number, 5);
    }

    #[test]
    fn pit_record_is_none_without_pit_out() {
        let entry = PitEntry {
            entry_time: Utc::now(),
            lap_number: 1,
        };
        assert!(pit_record_on_pit_out(&entry, false, Utc::now(), 1, None, None).is_none());
    }
}
