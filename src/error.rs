use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseInvalidSelector(String),

    #[error("Invalid search query: {0}")]
    InvalidQuery(String),
    #[error("Queue line {line}: {reason}")]
    Queue { line: usize, reason: String },

    #[error("Couldn't load page {url}: {reason}")]
    PageLoad { url: String, reason: String },
    #[error("Timed out loading page {0}")]
    PageTimeout(String),
    #[error("Gave up on {url} after {attempts} attempts")]
    TransientPageFailure { url: String, attempts: u32 },

    #[error("Couldn't persist job {job_id}: {reason}")]
    Persistence { job_id: String, reason: String },
    #[error("Repository Error: {0}")]
    Repository(String),

    #[error("Stopped by cancellation signal.")]
    Cancelled,
    #[error("Operator resume channel closed while a challenge was pending.")]
    ResumeChannelClosed,

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Url Error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Couldn't configure the browser: {0}")]
    BrowserLaunch(String),
    #[error("Browser Error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}
