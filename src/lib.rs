//! JOB LISTING SCRAPER
//! Walks paginated search results, waits on an operator whenever the site puts up a
//! challenge page, normalizes every card and stores each posting once.

mod error;
mod macros;

pub mod captcha;
pub mod config;
pub mod fixture;
pub mod listing;
pub mod navigate;
pub mod normalize;
pub mod parse;
pub mod process;
pub mod query;
pub mod queue;
pub mod request;
pub mod store;
pub mod tracker;

pub use error::{Error, Result};

const BASE_URL: &str = "https://www.indeed.com/jobs";
/// Cards a full result page carries. A shorter page is the last one.
const PAGE_SIZE: usize = 15;
/// The site offsets `start=` by 10 per page regardless of how many cards it shows.
const PAGE_OFFSET_STEP: usize = 10;
const MAX_RETRIES: u32 = 2;
const RETRY_BACKOFF_MS: u64 = 1_000;
const PAGE_TIMEOUT_SECS: u64 = 30;
const PAGE_DELAY_MIN_MS: u64 = 2_000;
const PAGE_DELAY_MAX_MS: u64 = 5_000;
const QUERY_PAUSE_SECS: u64 = 30;
const CHALLENGE_SETTLE_MS: u64 = 5_000;
/// 40 hours a week, 52 weeks a year.
pub const HOURS_PER_YEAR: f64 = 2_080.0;
const DEFAULT_RADIUS: u32 = 25;
const DEFAULT_MAX_PAGES: u32 = 3;
const DEFAULT_DAYS_AGO: u32 = 7;
const STORE_PATH: &str = "data/job_listings.jsonl";
const QUEUE_PATH: &str = "queries.txt";
const CONFIG_ENV: &str = "JOBSCRAP_CONFIG";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

pub use config::{BrowserKind, RetryPolicy, ScraperConfig};
pub use listing::{JobType, NormalizedListing, RawListing, SalaryPeriod, WorkSetting};
pub use query::{QuerySpec, Recency, SearchQuery};
pub use store::{IdScope, JobRepository, JsonlRepository, MemoryRepository};
pub use tracker::{DedupTracker, RunOutcome, ScrapeRun};

/// Path of the queue file the binary reads when none is given.
pub fn default_queue_path() -> &'static str {
    QUEUE_PATH
}

/// Environment variable naming a JSON config file.
pub fn config_env_var() -> &'static str {
    CONFIG_ENV
}
