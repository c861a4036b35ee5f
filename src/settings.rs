use once_cell::sync::Lazy;
use std::{env, time::Duration};

/// Holds all tunables, read-once from ENV with fallbacks.
pub struct Settings {
    /// Piped instances directory document.
    pub piped_directory_url: String,
    /// Invidious instances directory document.
    pub invidious_directory_url: String,
    /// Per-request timeout for directory fetches and probes.
    pub request_timeout: Duration,
    /// Upper bound on bytes fetched by the audio media probe.
    pub media_probe_bytes: u64,
    /// Capacity of the event broadcast channel.
    pub event_buffer_capacity: usize,
}

impl Settings {
    fn from_env() -> Self {
        // optionally load .env
        let _ = dotenvy::dotenv();

        fn parse_string(var: &str, default: &str) -> String {
            env::var(var).unwrap_or_else(|_| default.to_string())
        }

        fn parse_u64(var: &str, default: u64) -> u64 {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn parse_usize(var: &str, default: usize) -> usize {
            env::var(var)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn parse_secs(var: &str, default_secs: u64) -> Duration {
            env::var(var)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or_else(|| Duration::from_secs(default_secs))
        }

        Settings {
            piped_directory_url: parse_string(
                "PIPED_DIRECTORY_URL",
                "https://piped-instances.kavin.rocks/",
            ),
            invidious_directory_url: parse_string(
                "INVIDIOUS_DIRECTORY_URL",
                "https://api.invidious.io/instances.json",
            ),
            request_timeout: parse_secs("REQUEST_TIMEOUT_SECS", 10),
            media_probe_bytes: parse_u64("MEDIA_PROBE_BYTES", 64 * 1024),
            event_buffer_capacity: parse_usize("EVENT_BUFFER_CAPACITY", 100),
        }
    }
}

/// Global settings instance
pub static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);
