//! Relay configuration loading.
//!
//! Environment variables are the sole config source: `MODE`,
//! `REPLAY_FILE_PATH`, `REPLAY_SPEED`, `LISTEN_ADDR`. No file-based config —
//! unlike the forwarder's TOML convention, this process has few enough knobs
//! that env vars carry it cleanly.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Replay,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: Mode,
    pub replay_file_path: Option<PathBuf>,
    pub replay_speed: f64,
    pub listen_addr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid MODE '{0}': expected LIVE or REPLAY")]
    InvalidMode(String),
    #[error("MODE=REPLAY requires REPLAY_FILE_PATH to be set")]
    MissingReplayFilePath,
    #[error("invalid REPLAY_SPEED '{0}': {1}")]
    InvalidReplaySpeed(String, String),
}

/// Load and validate configuration from the process environment.
pub fn load_config() -> Result<RelayConfig, ConfigError> {
    load_from(|key| env::var(key).ok())
}

/// Load from an arbitrary key lookup — lets tests exercise validation
/// without mutating the real process environment.
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<RelayConfig, ConfigError> {
    let mode = match lookup("MODE").as_deref() {
        None | Some("LIVE") => Mode::Live,
        Some("REPLAY") => Mode::Replay,
        Some(other) => return Err(ConfigError::InvalidMode(other.to_owned())),
    };

    let replay_file_path = lookup("REPLAY_FILE_PATH").map(PathBuf::from);
    if mode == Mode::Replay && replay_file_path.is_none() {
        return Err(ConfigError::MissingReplayFilePath);
    }

    let replay_speed = match lookup("REPLAY_SPEED") {
        Some(s) => s
            .parse::<f64>()
            .map_err(|e| ConfigError::InvalidReplaySpeed(s.clone(), e.to_string()))?,
        None => 1.0,
    };

    let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_owned());

    Ok(RelayConfig {
        mode,
        replay_file_path,
        replay_speed,
        listen_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_live_mode_and_speed_one() {
        let cfg = load_from(env(&[])).unwrap();
        assert_eq!(cfg.mode, Mode::Live);
        assert_eq!(cfg.replay_speed, 1.0);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn replay_mode_requires_file_path() {
        let err = load_from(env(&[("MODE", "REPLAY")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingReplayFilePath));
    }

    #[test]
    fn replay_mode_with_file_path_succeeds() {
        let cfg = load_from(env(&[
            ("MODE", "REPLAY"),
            ("REPLAY_FILE_PATH", "/tmp/capture.ndjson"),
            ("REPLAY_SPEED", "4"),
        ]))
        .unwrap();
        assert_eq!(cfg.mode, Mode::Replay);
        assert_eq!(cfg.replay_file_path.unwrap(), PathBuf::from("/tmp/capture.ndjson"));
        assert_eq!(cfg.replay_speed, 4.0);
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = load_from(env(&[("MODE", "TURBO")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMode(_)));
    }
}
