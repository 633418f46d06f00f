use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as Chrome, BrowserConfig};
use futures::StreamExt;
use rand::Rng;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client, StatusCode,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::{info_time, warn_time, Error, Result, ScraperConfig};

/// A loaded page: where the session ended up and what it showed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub html: String,
}

/// One navigable session. It is held for a whole queue so the site keeps seeing the
/// same cookies, and it is driven strictly one page at a time.
#[async_trait]
pub trait Browser: Send {
    /// Navigates to `url` and returns the loaded page.
    async fn open(&mut self, url: &str) -> Result<Page>;

    /// Reads the current page again, e.g. after an operator cleared a challenge.
    async fn reload(&mut self) -> Result<Page>;
}

/// `Browser` driving one visible Chrome tab over CDP. The operator solves challenges in
/// that same window, so the clearance lands in the session that keeps scraping.
pub struct ChromeBrowser {
    chrome: Chrome,
    tab: chromiumoxide::Page,
    handler: JoinHandle<()>,
}

impl ChromeBrowser {
    pub async fn launch(config: &ScraperConfig) -> Result<Self> {
        let start_time = chrono::Local::now();
        let mut builder = BrowserConfig::builder()
            .request_timeout(config.page_timeout())
            .window_size(1280, 900)
            .arg(format!("--user-agent={}", config.user_agent));
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder.build().map_err(Error::BrowserLaunch)?;

        let (chrome, mut events) = Chrome::launch(browser_config).await?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        let tab = chrome.new_page("about:blank").await?;
        info_time!(start_time, "Chrome session started");

        Ok(Self {
            chrome,
            tab,
            handler,
        })
    }

    /// Closes the window and waits for the CDP event loop to wind down.
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.chrome.close().await {
            warn_time!("Chrome didn't close cleanly: {}", e);
        }
        self.handler.await?;
        Ok(())
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open(&mut self, url: &str) -> Result<Page> {
        self.tab.goto(url).await?;
        snapshot(&self.tab, url).await
    }

    /// Re-reads the tab as the operator left it, without navigating.
    async fn reload(&mut self) -> Result<Page> {
        snapshot(&self.tab, "").await
    }
}

async fn snapshot(tab: &chromiumoxide::Page, fallback_url: &str) -> Result<Page> {
    let html = tab.content().await?;
    let url = tab.url().await?.unwrap_or_else(|| fallback_url.to_string());
    Ok(Page { url, html })
}

/// `Browser` backed by a cookie-keeping `reqwest::Client`. No window: challenges can only
/// pass if the site lets the session through on its own.
pub struct HttpBrowser {
    client: Client,
    current: Option<String>,
}

impl HttpBrowser {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
        );

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.page_timeout())
            .build()?;

        Ok(Self {
            client,
            current: None,
        })
    }

    async fn fetch(&mut self, url: &str) -> Result<Page> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        let final_url = res.url().to_string();
        // Challenge pages come back as 403; the gate decides what they are.
        if !status.is_success() && status != StatusCode::FORBIDDEN {
            return Err(Error::PageLoad {
                url: url.into(),
                reason: format!("status {status}"),
            });
        }
        let html = res.text().await?;
        self.current = Some(final_url.clone());
        Ok(Page {
            url: final_url,
            html,
        })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open(&mut self, url: &str) -> Result<Page> {
        self.fetch(url).await
    }

    async fn reload(&mut self) -> Result<Page> {
        let url = self.current.clone().ok_or_else(|| Error::PageLoad {
            url: String::new(),
            reason: "nothing loaded yet".into(),
        })?;
        self.fetch(&url).await
    }
}

/// What one load attempt asks the browser for. Both carry the URL for error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load<'a> {
    Open(&'a str),
    Reload(&'a str),
}

impl Load<'_> {
    pub fn url(&self) -> &str {
        match self {
            Self::Open(url) | Self::Reload(url) => url,
        }
    }
}

/// A single attempt, bounded by `timeout` and ended early by `cancel`.
pub async fn load_once<B: Browser + ?Sized>(
    browser: &mut B,
    load: Load<'_>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Page> {
    let attempt = async {
        match load {
            Load::Open(url) => browser.open(url).await,
            Load::Reload(_) => browser.reload().await,
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        loaded = tokio::time::timeout(timeout, attempt) => {
            loaded.unwrap_or_else(|_| Err(Error::PageTimeout(load.url().into())))
        }
    }
}

/// Up to `policy.attempts()` bounded attempts with doubling backoff in between. Every retry
/// bumps `retries`. Exhausting the budget gives `TransientPageFailure`.
pub async fn load_with_retry<B: Browser + ?Sized>(
    browser: &mut B,
    load: Load<'_>,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    retries: &mut usize,
) -> Result<Page> {
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        if attempt > 1 {
            *retries += 1;
            pause(policy.backoff(attempt - 1), cancel).await?;
        }
        match load_once(browser, load, policy.timeout, cancel).await {
            Ok(page) => return Ok(page),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => warn_time!("Attempt {}/{} for {} failed: {}", attempt, attempts, load.url(), e),
        }
    }
    Err(Error::TransientPageFailure {
        url: load.url().into(),
        attempts,
    })
}

/// A random pause between `min_ms` and `max_ms`, so page transitions don't arrive on a beat.
pub fn human_delay(min_ms: u64, max_ms: u64) -> Duration {
    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

/// Sleeps unless cancelled first.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    if duration.is_zero() {
        return if cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        };
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
