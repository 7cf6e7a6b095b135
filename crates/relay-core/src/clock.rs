//! Lap-time string parsing and formatting.
//!
//! Arrival timestamps throughout `relay-core` are passed in as plain
//! `DateTime<Utc>` values rather than read from a clock abstraction — the
//! derivation functions in `derive.rs` take `arrival` as a parameter, so
//! tests simply pass fixed timestamps.

/// Parse a lap/sector time string in `M:S.f` or `S.f` form into seconds.
///
/// Returns `None` for empty or malformed input.
#[must_use]
pub fn parse_lap_time(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    if let Some((minutes, seconds)) = s.split_once(':') {
        let minutes: f64 = minutes.parse().ok()?;
        let seconds: f64 = seconds.parse().ok()?;
        Some(minutes * 60.0 + seconds)
    } else {
        s.parse().ok()
    }
}

/// Format seconds back into the upstream's `M:S.f` / `S.f` convention,
/// at millisecond precision.
#[must_use]
pub fn format_lap_time(total_seconds: f64) -> String {
    if total_seconds >= 60.0 {
        let minutes = (total_seconds / 60.0).floor();
        let seconds = total_seconds - minutes * 60.0;
        format!("{}:{:06.3}", minutes as i64, seconds)
    } else {
        format!("{total_seconds:.3}")
    }
}
