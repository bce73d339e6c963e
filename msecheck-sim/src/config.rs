//! Tunables for the simulated host.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading a simulator configuration file.
#[derive(Debug, Error)]
pub enum SimConfigError {
    #[error("failed to read sim config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid sim config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Behaviour of the simulated media stack.
///
/// Latencies are wall-clock delays before an operation completes; jitter is
/// drawn from a seeded ChaCha8 generator so runs are reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Delay before an append completes
    pub append_latency: Duration,
    /// Delay before a remove completes
    pub remove_latency: Duration,
    /// Upper bound of random extra latency added to each operation
    pub latency_jitter: Duration,
    /// Interval between playback clock ticks
    pub tick_interval: Duration,
    /// Media seconds played per wall-clock second
    pub playback_rate: f64,
    /// Gaps at most this long (seconds) are coalesced into one range
    pub merge_tolerance: f64,
    /// Seed for latency jitter
    pub seed: u64,
    /// Codecs `is_type_supported` accepts
    pub supported_codecs: Vec<String>,
    /// Whether the host offers segmented append at all
    pub media_source_supported: bool,
    /// Maximum buffers per media source
    pub max_source_buffers: usize,
    /// Queue an append issued while another append is in flight instead of
    /// rejecting it as busy
    pub queue_concurrent_appends: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::instant()
    }
}

impl SimConfig {
    /// Operations complete on the next scheduler turn and playback runs ten
    /// times faster than real time.
    pub fn instant() -> Self {
        Self {
            append_latency: Duration::ZERO,
            remove_latency: Duration::ZERO,
            latency_jitter: Duration::ZERO,
            tick_interval: Duration::from_millis(10),
            playback_rate: 10.0,
            merge_tolerance: 0.05,
            seed: 0x5eed,
            supported_codecs: vec!["simv.1".to_string(), "sima.1".to_string()],
            media_source_supported: true,
            max_source_buffers: 2,
            queue_concurrent_appends: false,
        }
    }

    /// Browser-like latencies with jitter and real-time playback.
    pub fn realistic() -> Self {
        Self {
            append_latency: Duration::from_millis(15),
            remove_latency: Duration::from_millis(5),
            latency_jitter: Duration::from_millis(10),
            tick_interval: Duration::from_millis(250),
            playback_rate: 1.0,
            ..Self::instant()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Loads a configuration from a JSON file; missing fields keep the
    /// `instant` values.
    ///
    /// # Errors
    ///
    /// - `SimConfigError::Io` - If the file cannot be read
    /// - `SimConfigError::Parse` - If the file is not valid configuration
    pub fn load(path: &Path) -> Result<Self, SimConfigError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Whether `type_string` names a supported mime type and codec set.
    pub fn supports_type(&self, type_string: &str) -> bool {
        let Some((mime, codecs)) = parse_type(type_string) else {
            return false;
        };
        if !matches!(mime, "video/x-sim" | "audio/x-sim") || codecs.is_empty() {
            return false;
        }
        codecs
            .iter()
            .all(|codec| self.supported_codecs.iter().any(|c| c == codec))
    }
}

/// Splits `mime; codecs="a,b"` into the mime type and its codec list.
fn parse_type(type_string: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = type_string.split(';');
    let mime = parts.next()?.trim();
    if mime.is_empty() {
        return None;
    }

    let codecs = parts
        .filter_map(|p| p.trim().strip_prefix("codecs="))
        .flat_map(|v| v.trim_matches('"').split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    Some((mime, codecs))
}
