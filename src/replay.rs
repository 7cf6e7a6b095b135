//! Capture-file replay driver: reproduces arrival pacing from a recorded
//! session and feeds frames into Ingress exactly as the live transport
//! would.

use crate::ingress::Ingress;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use relay_protocol::{CaptureKind, CaptureLine};
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("could not open replay file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error reading replay file: {0}")]
    Read(#[from] std::io::Error),
}

/// Replay `path` at `speed` (a multiplier; values above 1.0 accelerate
/// playback), handing each entry to `ingress` in arrival order.
pub async fn run_replay(ingress: &Ingress, path: &Path, speed: f64) -> Result<(), ReplayError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|source| ReplayError::Open {
            path: path.display().to_string(),
            source,
        })?;
    let mut lines = BufReader::new(file).lines();

    let mut prev_timestamp: Option<DateTime<Utc>> = None;
    let mut entry_count = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let entry: CaptureLine = match serde_json::from_str(&line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping malformed replay line");
                continue;
            }
        };

        if let Some(prev) = prev_timestamp {
            let delay = (entry.timestamp - prev).num_milliseconds().max(0) as f64 / 1000.0;
            if delay > 0.0 {
                tokio::time::sleep(std::time::Duration::from_secs_f64(delay / speed)).await;
            }
        }
        prev_timestamp = Some(entry.timestamp);

        match entry.kind {
            CaptureKind::Text => {
                if let Err(e) = ingress.handle_text_frame(&entry.data, entry.timestamp).await {
                    warn!(error = %e, "dropped malformed replay frame");
                }
            }
            CaptureKind::Binary => {
                match base64::engine::general_purpose::STANDARD.decode(entry.data.trim()) {
                    Ok(bytes) => ingress.handle_binary_frame(&bytes, entry.timestamp).await,
                    Err(e) => warn!(error = %e, "skipping undecodable binary replay line"),
                }
            }
        }
        entry_count += 1;
    }

    info!(entries = entry_count, "replay finished");
    Ok(())
}
