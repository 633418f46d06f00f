//! Challenge checkpoint.
//!
//! ```text
//! not-present -> detected -> awaiting-human -> resolved -> not-present
//!                                  ^     |
//!                                  +-----+  reload failed, or marker still there
//! ```
//!
//! The operator wait never times out. It takes exactly one resume signal per cycle, then
//! reloads the page under the usual timeout and retry budget. A failed reload or a marker
//! that is still there puts the gate back to waiting; only a clean page is handed back.

use std::time::Duration;

use scraper::{Html, Selector};
use tokio::sync::{mpsc, watch};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RetryPolicy;
use crate::request::{load_with_retry, pause, Browser, Load, Page};
use crate::{info_time, warn_time, Error, Result, ScraperConfig};

/// Elements that only show up on interstitial challenge pages.
const CHALLENGE_SELECTORS: &str = "#challenge-form, #challenge-stage, div.cf-turnstile, #px-captcha, \
    iframe[src*='hcaptcha'], iframe[src*='recaptcha'], iframe[src*='challenges.cloudflare.com']";
const CHALLENGE_TITLES: &[&str] = &["just a moment", "security check", "attention required"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptchaState {
    #[default]
    NotPresent,
    Detected,
    AwaitingHuman,
    Resolved,
}

/// Whether `html` is a challenge page rather than the content asked for.
pub fn detect_challenge(html: &str) -> bool {
    let doc = Html::parse_document(html);
    if let Ok(sel) = Selector::parse(CHALLENGE_SELECTORS) {
        if doc.select(&sel).next().is_some() {
            return true;
        }
    }
    let Ok(title_sel) = Selector::parse("title") else {
        return false;
    };
    doc.select(&title_sel).any(|title| {
        let title = title.text().collect::<String>().to_lowercase();
        CHALLENGE_TITLES.iter().any(|marker| title.contains(marker))
    })
}

/// The operator's side of the gate. Cloneable; only one signal is held at a time.
#[derive(Debug, Clone)]
pub struct ResumeHandle {
    tx: mpsc::Sender<()>,
}

impl ResumeHandle {
    /// Signals that the challenge was dealt with. Returns `false` when a signal is
    /// already pending or the gate is gone.
    pub fn resume(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// What the gate went through for one page. Filled in as it happens, so the counts are
/// there even when clearing ends in an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChallengeTally {
    /// Challenges found on first load.
    pub detected: usize,
    /// Resumes after which the page was still a challenge or couldn't be reloaded.
    pub unresolved: usize,
    /// Reload attempts repeated after a failure or timeout.
    pub reload_retries: usize,
}

pub struct CaptchaGate {
    state: watch::Sender<CaptchaState>,
    resume_rx: mpsc::Receiver<()>,
    settle: Duration,
    retry: RetryPolicy,
}

impl CaptchaGate {
    /// Creates a gate and the handle the operator resumes it with. `settle` is how long to
    /// let the page finish loading after a resume before checking it again.
    pub fn new(settle: Duration) -> (Self, ResumeHandle) {
        let (tx, resume_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(CaptchaState::NotPresent);
        (
            Self {
                state,
                resume_rx,
                settle,
                retry: RetryPolicy::default(),
            },
            ResumeHandle { tx },
        )
    }

    /// A gate that settles and reloads the way `config` loads pages.
    pub fn from_config(config: &ScraperConfig) -> (Self, ResumeHandle) {
        let (gate, resume) = Self::new(config.challenge_settle());
        (gate.with_retry(config.retry_policy()), resume)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> CaptchaState {
        *self.state.borrow()
    }

    /// Observes state changes, e.g. to prompt an operator on `AwaitingHuman`.
    pub fn subscribe(&self) -> watch::Receiver<CaptchaState> {
        self.state.subscribe()
    }

    fn set(&self, state: CaptchaState) {
        self.state.send_replace(state);
    }

    /// Lets `page` through if it is not a challenge. Otherwise suspends until the operator
    /// resumes and a reload shows the challenge gone. Cancellation ends the wait.
    pub async fn clear<B: Browser + ?Sized>(
        &mut self,
        browser: &mut B,
        page: Page,
        tally: &mut ChallengeTally,
        cancel: &CancellationToken,
    ) -> Result<Page> {
        if !detect_challenge(&page.html) {
            return Ok(page);
        }

        tally.detected += 1;
        self.set(CaptchaState::Detected);
        warn_time!("Challenge page detected at {}", page.url);
        let outcome = self.await_operator(browser, &page.url, tally, cancel).await;
        self.set(CaptchaState::NotPresent);
        outcome
    }

    async fn await_operator<B: Browser + ?Sized>(
        &mut self,
        browser: &mut B,
        url: &str,
        tally: &mut ChallengeTally,
        cancel: &CancellationToken,
    ) -> Result<Page> {
        loop {
            // Signals sent before this suspension don't count.
            while self.resume_rx.try_recv().is_ok() {}
            self.set(CaptchaState::AwaitingHuman);
            info_time!("Waiting for the operator to solve the challenge and resume");

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                signal = self.resume_rx.recv() => {
                    if signal.is_none() {
                        return Err(Error::ResumeChannelClosed);
                    }
                }
            }

            pause(self.settle, cancel).await?;
            let reloaded = load_with_retry(
                browser,
                Load::Reload(url),
                self.retry,
                cancel,
                &mut tally.reload_retries,
            )
            .await;
            let page = match reloaded {
                Ok(page) => page,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tally.unresolved += 1;
                    warn_time!("Couldn't reload after resume #{}: {}", tally.unresolved, e);
                    continue;
                }
            };
            if detect_challenge(&page.html) {
                tally.unresolved += 1;
                warn_time!("Challenge still present after resume #{}", tally.unresolved);
                continue;
            }

            self.set(CaptchaState::Resolved);
            info_time!("Challenge cleared, continuing with {}", page.url);
            return Ok(page);
        }
    }
}

/// Prompts on stdout and reads one line from stdin each time the gate starts waiting.
/// Stdin is not read at any other time.
pub fn spawn_stdin_operator(
    resume: ResumeHandle,
    mut states: watch::Receiver<CaptchaState>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while states.changed().await.is_ok() {
            if *states.borrow_and_update() != CaptchaState::AwaitingHuman {
                continue;
            }
            println!("Solve the challenge in the browser, wait for the page to load, then press Enter.");
            match lines.next_line().await {
                Ok(Some(_)) => {
                    resume.resume();
                }
                _ => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureBrowser;

    const URL: &str = "https://example.test/jobs";
    const CHALLENGE: &str =
        r#"<html><head><title>Just a moment...</title></head><body><div id="challenge-form"></div></body></html>"#;
    const CLEAN: &str = r#"<html><head><title>Jobs</title></head><body><div class="job_seen_beacon"></div></body></html>"#;

    fn page(html: &str) -> Page {
        Page {
            url: URL.into(),
            html: html.into(),
        }
    }

    fn gate() -> (CaptchaGate, ResumeHandle) {
        let (gate, resume) = CaptchaGate::new(Duration::ZERO);
        let retry = RetryPolicy {
            timeout: Duration::from_secs(1),
            max_retries: 1,
            backoff_ms: 0,
        };
        (gate.with_retry(retry), resume)
    }

    /// Resumes each time the gate starts waiting, `times` times over.
    async fn operator(
        resume: &ResumeHandle,
        states: &mut watch::Receiver<CaptchaState>,
        times: usize,
    ) -> usize {
        let mut resumes = 0;
        while resumes < times && states.changed().await.is_ok() {
            if *states.borrow_and_update() == CaptchaState::AwaitingHuman {
                resumes += 1;
                assert!(resume.resume());
            }
        }
        resumes
    }

    #[test]
    fn detects_markers() {
        assert!(detect_challenge(CHALLENGE));
        assert!(detect_challenge("<title>Security Check</title>"));
        assert!(detect_challenge(r#"<iframe src="https://www.google.com/recaptcha/api2"></iframe>"#));
        assert!(!detect_challenge(CLEAN));
    }

    #[tokio::test]
    async fn clean_page_passes_straight_through() {
        let (mut gate, _resume) = gate();
        let mut browser = FixtureBrowser::new();
        let mut tally = ChallengeTally::default();
        let page = gate
            .clear(&mut browser, page(CLEAN), &mut tally, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(page.html, CLEAN);
        assert_eq!(tally, ChallengeTally::default());
        assert_eq!(browser.request_count(), 0);
        assert_eq!(gate.state(), CaptchaState::NotPresent);
    }

    #[tokio::test]
    async fn waits_for_resume_and_revalidates() {
        let (mut gate, resume) = gate();
        let mut states = gate.subscribe();
        // Loaded as a challenge, still a challenge on the first reload, clean on the second.
        let mut browser = FixtureBrowser::new()
            .with_page(URL, CHALLENGE)
            .with_page(URL, CHALLENGE)
            .with_page(URL, CLEAN);
        let loaded = browser.open(URL).await.unwrap();

        // A signal sent before the challenge was seen must not count.
        assert!(resume.resume());

        let cancel = CancellationToken::new();
        let mut tally = ChallengeTally::default();
        let (cleared, resumes) = tokio::join!(
            gate.clear(&mut browser, loaded, &mut tally, &cancel),
            operator(&resume, &mut states, 2)
        );

        assert_eq!(cleared.unwrap().html, CLEAN);
        assert_eq!(resumes, 2);
        assert_eq!(tally.detected, 1);
        assert_eq!(tally.unresolved, 1);
        assert_eq!(gate.state(), CaptchaState::NotPresent);
        assert_eq!(browser.request_count(), 3);
    }

    #[tokio::test]
    async fn failed_reload_goes_back_to_waiting() {
        let (mut gate, resume) = gate();
        let mut states = gate.subscribe();
        // Both reload attempts after the first resume fail; the one after the second works.
        let mut browser = FixtureBrowser::new()
            .with_page(URL, CHALLENGE)
            .with_failure(URL, "connection reset")
            .with_failure(URL, "connection reset")
            .with_page(URL, CLEAN);
        let loaded = browser.open(URL).await.unwrap();

        let cancel = CancellationToken::new();
        let mut tally = ChallengeTally::default();
        let (cleared, resumes) = tokio::join!(
            gate.clear(&mut browser, loaded, &mut tally, &cancel),
            operator(&resume, &mut states, 2)
        );

        assert_eq!(cleared.unwrap().html, CLEAN);
        assert_eq!(resumes, 2);
        assert_eq!(tally.unresolved, 1);
        assert_eq!(tally.reload_retries, 1);
        assert_eq!(browser.requests_for(URL), 4);
    }

    #[tokio::test]
    async fn does_not_return_without_resume() {
        let (mut gate, _resume) = gate();
        let mut browser = FixtureBrowser::new().with_page(URL, CLEAN);
        let cancel = CancellationToken::new();
        let mut tally = ChallengeTally::default();
        let waited = tokio::time::timeout(
            Duration::from_millis(50),
            gate.clear(&mut browser, page(CHALLENGE), &mut tally, &cancel),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(tally.detected, 1);
        assert_eq!(browser.request_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_ends_the_wait_and_keeps_the_count() {
        let (mut gate, _resume) = gate();
        let mut browser = FixtureBrowser::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut tally = ChallengeTally::default();
        let res = gate.clear(&mut browser, page(CHALLENGE), &mut tally, &cancel).await;
        assert!(matches!(res, Err(Error::Cancelled)));
        assert_eq!(tally.detected, 1);
        assert_eq!(gate.state(), CaptchaState::NotPresent);
    }
}
