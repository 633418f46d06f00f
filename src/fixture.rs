//! Scripted `Browser` for exercising the pipeline without a network.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;

use crate::request::{Browser, Page};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureResponse {
    Html(String),
    /// The load fails the way a dropped connection would.
    Fail(String),
}

/// Serves canned responses per URL.
///
/// Each URL holds a script of responses consumed in order; the last one repeats forever.
/// `reload` consumes from the script of the page currently shown.
///
/// ```rust
/// use jobscrap::fixture::FixtureBrowser;
///
/// let browser = FixtureBrowser::new()
///     .with_page("https://example.test/a", "<p>hello</p>")
///     .with_failure("https://example.test/b", "connection reset");
/// assert_eq!(browser.request_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct FixtureBrowser {
    scripts: HashMap<String, VecDeque<FixtureResponse>>,
    current: Option<String>,
    requests: Vec<String>,
}

impl FixtureBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response to the script for `url`.
    pub fn push(&mut self, url: impl Into<String>, response: FixtureResponse) {
        self.scripts.entry(url.into()).or_default().push_back(response);
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.push(url, FixtureResponse::Html(html.into()));
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, reason: impl Into<String>) -> Self {
        self.push(url, FixtureResponse::Fail(reason.into()));
        self
    }

    /// Every URL loaded so far, reloads included, in order.
    pub fn requests(&self) -> &[String] {
        &self.requests
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// How many times `url` was loaded.
    pub fn requests_for(&self, url: &str) -> usize {
        self.requests.iter().filter(|r| r.as_str() == url).count()
    }

    fn serve(&mut self, url: &str) -> Result<Page> {
        self.requests.push(url.to_string());
        self.current = Some(url.to_string());
        let script = self.scripts.get_mut(url).ok_or_else(|| Error::PageLoad {
            url: url.into(),
            reason: "no fixture for url".into(),
        })?;
        let response = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match response {
            Some(FixtureResponse::Html(html)) => Ok(Page {
                url: url.into(),
                html,
            }),
            Some(FixtureResponse::Fail(reason)) => Err(Error::PageLoad {
                url: url.into(),
                reason,
            }),
            None => Err(Error::PageLoad {
                url: url.into(),
                reason: "empty fixture script".into(),
            }),
        }
    }
}

#[async_trait]
impl Browser for FixtureBrowser {
    async fn open(&mut self, url: &str) -> Result<Page> {
        self.serve(url)
    }

    async fn reload(&mut self) -> Result<Page> {
        let url = self.current.clone().ok_or_else(|| Error::PageLoad {
            url: String::new(),
            reason: "nothing loaded yet".into(),
        })?;
        self.serve(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn last_response_repeats() {
        let mut browser = FixtureBrowser::new()
            .with_failure("u", "boom")
            .with_page("u", "ok");
        assert!(browser.open("u").await.is_err());
        assert_eq!(browser.open("u").await.unwrap().html, "ok");
        assert_eq!(browser.reload().await.unwrap().html, "ok");
        assert_eq!(browser.requests_for("u"), 3);
        assert!(browser.open("missing").await.is_err());
    }
}
