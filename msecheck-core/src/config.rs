//! Centralized configuration for msecheck.
//!
//! All tunable timeouts, caps and fetch settings live here instead of being
//! hard-coded in the drivers.

use std::time::Duration;

/// Central configuration for a conformance run.
///
/// Supports environment variable overrides through [`MsecheckConfig::from_env`].
#[derive(Debug, Clone, Default)]
pub struct MsecheckConfig {
    pub timeouts: TimeoutConfig,
    pub append: AppendConfig,
    pub playback: PlaybackConfig,
    pub fetch: FetchConfig,
}

/// Wall-clock budgets.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Budget for a whole test unless the test overrides it
    pub default_test_timeout: Duration,
    /// Longest wait for a single host event (updateend, seeked, ...)
    pub event_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_test_timeout: Duration::from_secs(30),
            event_timeout: Duration::from_secs(10),
        }
    }
}

/// Append driver limits.
#[derive(Debug, Clone)]
pub struct AppendConfig {
    /// Upper bound on pull+append rounds in a single `append_until`
    pub max_append_iterations: usize,
    /// Chunk size for sources without a segment table
    pub default_pull_size: u64,
    /// Acceptance rule for the double-append case
    pub double_append_policy: DoubleAppendPolicy,
}

/// How a second append issued while the first is in flight is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DoubleAppendPolicy {
    /// Passes on a busy rejection, or when both appends complete and the
    /// buffer ends idle with intact ranges
    #[default]
    Tolerant,
    /// Passes only when the second append is rejected as busy
    Strict,
}

impl Default for AppendConfig {
    fn default() -> Self {
        Self {
            max_append_iterations: 1000,
            default_pull_size: 65536, // 64 KiB
            double_append_policy: DoubleAppendPolicy::Tolerant,
        }
    }
}

/// Playback driver limits.
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Real-time ceiling for `play_through`
    pub playback_ceiling: Duration,
    /// Seconds of media kept buffered ahead of the playhead
    pub lookahead: f64,
    /// Tolerance for approximate time comparisons
    pub time_tolerance: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playback_ceiling: Duration::from_secs(60),
            lookahead: 2.0,
            time_tolerance: 0.05,
        }
    }
}

/// Network fetch settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Base URL relative stream URLs are resolved against
    pub media_base_url: Option<String>,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// User agent for range requests
    pub user_agent: &'static str,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            media_base_url: None,
            request_timeout: Duration::from_secs(30),
            user_agent: "msecheck/0.1.0",
        }
    }
}

impl MsecheckConfig {
    /// Creates configuration with environment variable overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("MSECHECK_TEST_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.timeouts.default_test_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(timeout) = std::env::var("MSECHECK_EVENT_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.timeouts.event_timeout = Duration::from_secs(seconds);
            }
        }

        if let Ok(max_appends) = std::env::var("MSECHECK_MAX_APPENDS") {
            if let Ok(count) = max_appends.parse::<usize>() {
                config.append.max_append_iterations = count;
            }
        }

        if let Ok(strict) = std::env::var("MSECHECK_STRICT_DOUBLE_APPEND") {
            if matches!(strict.as_str(), "1" | "true" | "yes") {
                config.append.double_append_policy = DoubleAppendPolicy::Strict;
            }
        }

        if let Ok(ceiling) = std::env::var("MSECHECK_PLAYBACK_CEILING") {
            if let Ok(seconds) = ceiling.parse::<u64>() {
                config.playback.playback_ceiling = Duration::from_secs(seconds);
            }
        }

        if let Ok(base_url) = std::env::var("MSECHECK_MEDIA_BASE_URL") {
            config.fetch.media_base_url = Some(base_url);
        }

        config
    }

    /// Creates a configuration with short budgets for the test suite.
    pub fn for_testing() -> Self {
        Self {
            timeouts: TimeoutConfig {
                default_test_timeout: Duration::from_secs(10),
                event_timeout: Duration::from_secs(2),
            },
            append: AppendConfig {
                max_append_iterations: 200,
                default_pull_size: 4096,
                ..AppendConfig::default()
            },
            playback: PlaybackConfig {
                playback_ceiling: Duration::from_secs(20),
                ..PlaybackConfig::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = MsecheckConfig::default();

        assert_eq!(config.timeouts.default_test_timeout, Duration::from_secs(30));
        assert_eq!(config.timeouts.event_timeout, Duration::from_secs(10));
        assert_eq!(config.append.max_append_iterations, 1000);
        assert_eq!(config.append.default_pull_size, 65536);
        assert_eq!(config.playback.lookahead, 2.0);
        assert!(config.fetch.media_base_url.is_none());
        assert_eq!(config.append.double_append_policy, DoubleAppendPolicy::Tolerant);
    }

    #[test]
    fn test_testing_preset_is_tighter() {
        let testing = MsecheckConfig::for_testing();
        let default = MsecheckConfig::default();

        assert!(testing.timeouts.default_test_timeout < default.timeouts.default_test_timeout);
        assert!(testing.append.max_append_iterations < default.append.max_append_iterations);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("MSECHECK_TEST_TIMEOUT", "90");
            std::env::set_var("MSECHECK_MAX_APPENDS", "7");
            std::env::set_var("MSECHECK_MEDIA_BASE_URL", "http://media.local/");
            std::env::set_var("MSECHECK_STRICT_DOUBLE_APPEND", "true");
        }

        let config = MsecheckConfig::from_env();

        assert_eq!(config.timeouts.default_test_timeout, Duration::from_secs(90));
        assert_eq!(config.append.max_append_iterations, 7);
        assert_eq!(
            config.fetch.media_base_url.as_deref(),
            Some("http://media.local/")
        );
        assert_eq!(config.append.double_append_policy, DoubleAppendPolicy::Strict);

        unsafe {
            std::env::remove_var("MSECHECK_TEST_TIMEOUT");
            std::env::remove_var("MSECHECK_MAX_APPENDS");
            std::env::remove_var("MSECHECK_MEDIA_BASE_URL");
            std::env::remove_var("MSECHECK_STRICT_DOUBLE_APPEND");
        }
    }
}
