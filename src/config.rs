use std::{path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{
    Result, BASE_URL, CHALLENGE_SETTLE_MS, DEFAULT_DAYS_AGO, DEFAULT_MAX_PAGES, DEFAULT_RADIUS,
    HOURS_PER_YEAR, MAX_RETRIES, PAGE_DELAY_MAX_MS, PAGE_DELAY_MIN_MS, PAGE_OFFSET_STEP,
    PAGE_SIZE, PAGE_TIMEOUT_SECS, QUERY_PAUSE_SECS, RETRY_BACKOFF_MS, STORE_PATH, USER_AGENT,
};

/// Tunables for one invocation. Every field falls back to the crate constant of the same name,
/// so a config file only needs the keys it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub page_size: usize,
    pub page_offset_step: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub page_timeout_secs: u64,
    pub page_delay_min_ms: u64,
    pub page_delay_max_ms: u64,
    pub query_pause_secs: u64,
    pub challenge_settle_ms: u64,
    pub hours_per_year: f64,
    pub default_radius: u32,
    pub default_max_pages: u32,
    pub default_days_ago: u32,
    pub store_path: PathBuf,
    pub user_agent: String,
    pub browser: BrowserKind,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
}

/// Which session backend drives the scrape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    /// A Chrome window the operator can solve challenges in.
    #[default]
    Chrome,
    /// Plain HTTP with a cookie jar. Challenges can't be solved by hand here.
    Http,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.into(),
            page_size: PAGE_SIZE,
            page_offset_step: PAGE_OFFSET_STEP,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            page_timeout_secs: PAGE_TIMEOUT_SECS,
            page_delay_min_ms: PAGE_DELAY_MIN_MS,
            page_delay_max_ms: PAGE_DELAY_MAX_MS,
            query_pause_secs: QUERY_PAUSE_SECS,
            challenge_settle_ms: CHALLENGE_SETTLE_MS,
            hours_per_year: HOURS_PER_YEAR,
            default_radius: DEFAULT_RADIUS,
            default_max_pages: DEFAULT_MAX_PAGES,
            default_days_ago: DEFAULT_DAYS_AGO,
            store_path: STORE_PATH.into(),
            user_agent: USER_AGENT.into(),
            browser: BrowserKind::default(),
            headless: false,
            chrome_executable: None,
        }
    }
}

impl ScraperConfig {
    /// Reads a JSON config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Zero delays everywhere. Used for fixture-driven runs.
    pub fn without_delays(mut self) -> Self {
        self.retry_backoff_ms = 0;
        self.page_delay_min_ms = 0;
        self.page_delay_max_ms = 0;
        self.query_pause_secs = 0;
        self.challenge_settle_ms = 0;
        self
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    /// Backoff before retry number `attempt` (1-based), doubling each time.
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        self.retry_policy().backoff(attempt)
    }

    /// How every page load other than the operator wait is bounded.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout: self.page_timeout(),
            max_retries: self.max_retries,
            backoff_ms: self.retry_backoff_ms,
        }
    }

    pub fn query_pause(&self) -> Duration {
        Duration::from_secs(self.query_pause_secs)
    }

    pub fn challenge_settle(&self) -> Duration {
        Duration::from_millis(self.challenge_settle_ms)
    }
}

/// Timeout per attempt plus a bounded number of retries with doubling backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        ScraperConfig::default().retry_policy()
    }
}
