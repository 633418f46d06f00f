//! Drives one search through its result pages.
//!
//! Per page: pause, load (bounded timeout, retried with backoff), clear the challenge gate,
//! extract, then normalize, dedup and store each card. Pagination stops at the page budget,
//! on a short page, or when the site says there is nothing more.

use chrono::{DateTime, Local, Utc};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::captcha::{CaptchaGate, ChallengeTally};
use crate::listing::{JobType, NormalizedListing, RawListing, WorkSetting};
use crate::normalize::{normalize, parse_job_type, parse_relative_date, parse_work_setting, NormalizeContext};
use crate::parse::{parse_detail_page, parse_result_page, DetailPage};
use crate::request::{human_delay, load_once, load_with_retry, pause, Browser, Load, Page};
use crate::store::JobRepository;
use crate::tracker::{DedupTracker, ScrapeRun};
use crate::{info_time, warn_time, Error, Result, ScraperConfig, SearchQuery};

pub struct Navigator<'a, B: Browser + ?Sized, R: JobRepository + ?Sized> {
    browser: &'a mut B,
    gate: &'a mut CaptchaGate,
    repo: &'a R,
    dedup: &'a mut DedupTracker,
    config: &'a ScraperConfig,
    cancel: &'a CancellationToken,
}

impl<'a, B: Browser + ?Sized, R: JobRepository + ?Sized> Navigator<'a, B, R> {
    pub fn new(
        browser: &'a mut B,
        gate: &'a mut CaptchaGate,
        repo: &'a R,
        dedup: &'a mut DedupTracker,
        config: &'a ScraperConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            browser,
            gate,
            repo,
            dedup,
            config,
            cancel,
        }
    }

    /// Runs `query` to completion and returns its finalized record. Never fails as a whole:
    /// whatever stopped the walk is folded into the run's outcome and reason.
    pub async fn run(&mut self, query: &SearchQuery) -> ScrapeRun {
        let start_time = Local::now();
        let first_url = match query.search_url(&self.config.base_url, 0, self.config.page_offset_step) {
            Ok(url) => url,
            Err(e) => return ScrapeRun::rejected(query.job_title(), &e),
        };

        let mut run = ScrapeRun::start(query.job_title(), first_url.as_str());
        info_time!(
            "Started '{}' (up to {} pages): {}",
            query.job_title(),
            query.max_pages(),
            first_url
        );

        let result = self.walk(query, &mut run).await;
        run.finish(result);
        run.log_summary();
        info_time!(start_time, "Finished '{}'", query.job_title());
        run
    }

    async fn walk(&mut self, query: &SearchQuery, run: &mut ScrapeRun) -> Result<()> {
        for page_num in 0..query.max_pages() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if page_num > 0 {
                let delay = human_delay(self.config.page_delay_min_ms, self.config.page_delay_max_ms);
                pause(delay, self.cancel).await?;
            }

            let url = query.search_url(&self.config.base_url, page_num, self.config.page_offset_step)?;
            let page = self.open_with_retry(url.as_str(), run).await?;
            let page = self.pass_gate(page, run).await?;
            run.pages_visited += 1;

            let page_url = Url::parse(&page.url)?;
            let results = parse_result_page(page.html, page_url).await?;
            run.listings_seen += results.cards_found;
            run.malformed += results.malformed;
            if results.malformed > 0 {
                warn_time!("Page {}: skipped {} malformed cards", page_num + 1, results.malformed);
            }

            let scraped_at = Utc::now();
            for raw in results.listings {
                self.handle_listing(raw, query, scraped_at, run).await?;
            }
            info_time!(
                "Page {} of '{}': {} cards, {} saved so far",
                page_num + 1,
                query.job_title(),
                results.cards_found,
                run.persisted
            );

            if results.cards_found < self.config.page_size || results.no_more_results {
                info_time!("No more result pages after page {}", page_num + 1);
                break;
            }
        }
        Ok(())
    }

    async fn handle_listing(
        &mut self,
        raw: RawListing,
        query: &SearchQuery,
        scraped_at: DateTime<Utc>,
        run: &mut ScrapeRun,
    ) -> Result<()> {
        let ctx = NormalizeContext {
            query,
            search_url: &run.search_url,
            scraped_at,
            hours_per_year: self.config.hours_per_year,
        };
        let Some(mut listing) = normalize(raw, &ctx) else {
            run.malformed += 1;
            return Ok(());
        };

        if self.dedup.is_known(&listing.job_id) {
            run.duplicates += 1;
            return Ok(());
        }

        if query.fetch_descriptions() {
            self.enrich(&mut listing, run).await?;
        }

        self.repo
            .upsert(&listing)
            .await
            .map_err(|e| Error::Persistence {
                job_id: listing.job_id.clone(),
                reason: e.to_string(),
            })?;
        self.dedup.mark(listing.job_id);
        run.persisted += 1;
        Ok(())
    }

    /// Fills the description and sharper fields from the detail page. Failing to get it costs
    /// only this record's extras.
    async fn enrich(&mut self, listing: &mut NormalizedListing, run: &mut ScrapeRun) -> Result<()> {
        let delay = human_delay(self.config.page_delay_min_ms, self.config.page_delay_max_ms);
        pause(delay, self.cancel).await?;

        let fetched = self.fetch_detail(&listing.job_url, run).await;
        match fetched {
            Ok(detail) => apply_detail(listing, detail),
            Err(e @ (Error::Cancelled | Error::ResumeChannelClosed)) => return Err(e),
            Err(e) => {
                run.description_failures += 1;
                warn_time!("No description for {}: {}", listing.job_id, e);
            }
        }
        Ok(())
    }

    async fn fetch_detail(&mut self, url: &str, run: &mut ScrapeRun) -> Result<DetailPage> {
        let page = self.open_once(url).await?;
        let page = self.pass_gate(page, run).await?;
        parse_detail_page(page.html).await
    }

    async fn open_with_retry(&mut self, url: &str, run: &mut ScrapeRun) -> Result<Page> {
        let policy = self.config.retry_policy();
        load_with_retry(&mut *self.browser, Load::Open(url), policy, self.cancel, &mut run.page_retries).await
    }

    async fn open_once(&mut self, url: &str) -> Result<Page> {
        load_once(&mut *self.browser, Load::Open(url), self.config.page_timeout(), self.cancel).await
    }

    /// Challenge counts land on `run` whether or not the gate clears.
    async fn pass_gate(&mut self, page: Page, run: &mut ScrapeRun) -> Result<Page> {
        let mut tally = ChallengeTally::default();
        let cleared = self
            .gate
            .clear(&mut *self.browser, page, &mut tally, self.cancel)
            .await;
        run.challenges_detected += tally.detected;
        run.challenges_unresolved += tally.unresolved;
        run.page_retries += tally.reload_retries;
        cleared
    }
}

/// The detail page's exact date wins over the card's relative one; its job type and work
/// setting only fill what the card and query left unknown.
fn apply_detail(listing: &mut NormalizedListing, detail: DetailPage) {
    let as_of = listing.date_scraped.with_timezone(&Local).date_naive();
    if let Some(date) = detail
        .date_posted
        .as_deref()
        .and_then(|text| parse_relative_date(text, as_of))
    {
        listing.date_posted = Some(date);
    }
    if listing.job_type == JobType::Unknown {
        if let Some(text) = detail.job_type.as_deref() {
            listing.job_type = parse_job_type(text);
        }
    }
    if listing.work_setting == WorkSetting::Unknown {
        if let Some(setting) = detail.work_setting.as_deref().and_then(parse_work_setting) {
            listing.work_setting = setting;
        }
    }
    listing.job_description = detail.description;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn detail_fills_only_unknowns() {
        let mut listing = NormalizedListing {
            job_id: "abc".into(),
            title: "Analyst".into(),
            company: "Acme".into(),
            city: None,
            state: None,
            zip: None,
            work_setting: WorkSetting::Remote,
            job_type: JobType::Unknown,
            salary_period: crate::SalaryPeriod::Unknown,
            salary_min: None,
            salary_max: None,
            salary_min_yearly: None,
            salary_max_yearly: None,
            date_posted: None,
            date_scraped: Utc::now(),
            job_url: "https://example.test/viewjob?jk=abc".into(),
            search_url: "https://example.test/jobs?q=Analyst".into(),
            queried_job_title: "Analyst".into(),
            job_description: None,
        };
        apply_detail(
            &mut listing,
            DetailPage {
                description: Some("Crunch numbers.".into()),
                date_posted: Some("2020-01-15".into()),
                job_type: Some("Contract".into()),
                work_setting: Some("In person".into()),
            },
        );
        assert_eq!(listing.job_type, JobType::Contract);
        assert_eq!(listing.work_setting, WorkSetting::Remote);
        assert_eq!(listing.date_posted, NaiveDate::from_ymd_opt(2020, 1, 15));
        assert_eq!(listing.job_description.as_deref(), Some("Crunch numbers."));
    }
}
