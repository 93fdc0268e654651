use crate::infrastructure::error::EngineError;
use chrono::Duration;
use url::Url;

pub const DEFAULT_REFRESH_MINUTES: u32 = 15;
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;
pub const DEFAULT_ACTIVE_CHECK_SECONDS: u64 = 30;

const MIN_REFRESH_MINUTES: u32 = 1;
const MAX_REFRESH_MINUTES: u32 = 1440;
const MAX_WINDOW_MINUTES: i64 = 120;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub feed_url: Url,
    pub refresh_interval_minutes: u32,
    pub window_before_minutes: i64,
    pub window_after_minutes: i64,
    pub active_check_seconds: u64,
}

impl EngineConfig {
    pub fn from_settings(
        feed_url: &str,
        refresh_interval_minutes: Option<u32>,
        window_before_minutes: Option<i64>,
        window_after_minutes: Option<i64>,
    ) -> Result<Self, EngineError> {
        let feed_url = normalize_feed_url(feed_url)?;
        Ok(Self {
            feed_url,
            refresh_interval_minutes: refresh_interval_minutes
                .unwrap_or(DEFAULT_REFRESH_MINUTES)
                .clamp(MIN_REFRESH_MINUTES, MAX_REFRESH_MINUTES),
            window_before_minutes: clamp_window_minutes(
                window_before_minutes.unwrap_or(DEFAULT_WINDOW_MINUTES),
            ),
            window_after_minutes: clamp_window_minutes(
                window_after_minutes.unwrap_or(DEFAULT_WINDOW_MINUTES),
            ),
            active_check_seconds: DEFAULT_ACTIVE_CHECK_SECONDS,
        })
    }

    pub fn window_before(&self) -> Duration {
        Duration::minutes(self.window_before_minutes)
    }

    pub fn window_after(&self) -> Duration {
        Duration::minutes(self.window_after_minutes)
    }
}

pub fn clamp_window_minutes(minutes: i64) -> i64 {
    minutes.clamp(0, MAX_WINDOW_MINUTES)
}

/// Validate the feed URL, rewriting a `webcal://` scheme to `https://` first.
/// The rewrite happens on the raw string because the url crate refuses scheme
/// changes between special and non-special schemes.
pub fn normalize_feed_url(raw: &str) -> Result<Url, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EngineError::InvalidConfig(
            "feed URL must not be empty".to_string(),
        ));
    }

    let has_webcal_scheme = raw
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("webcal://"));
    let rewritten = if has_webcal_scheme {
        format!("https://{}", &raw[9..])
    } else {
        raw.to_string()
    };

    Url::parse(&rewritten)
        .map_err(|error| EngineError::InvalidConfig(format!("invalid feed URL '{raw}': {error}")))
}
