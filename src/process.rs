use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::captcha::CaptchaGate;
use crate::navigate::Navigator;
use crate::request::{pause, Browser};
use crate::store::{IdScope, JobRepository};
use crate::tracker::{DedupTracker, RunOutcome, ScrapeRun};
use crate::{info_time, warn_time, QuerySpec, Result, ScraperConfig, SearchQuery};

/// Runs every queued search, strictly one after another, on one browser session.
///
/// A search that fails validation or goes wrong mid-walk only affects its own `ScrapeRun`;
/// the rest of the queue still runs. The only error returned is failing to read the ids
/// already stored, since nothing could be deduplicated without them. Once `cancel` fires,
/// the current search is wrapped up and no further ones start.
pub async fn process_queue<B, R>(
    specs: Vec<QuerySpec>,
    browser: &mut B,
    gate: &mut CaptchaGate,
    repo: &R,
    config: &ScraperConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ScrapeRun>>
where
    B: Browser + ?Sized,
    R: JobRepository + ?Sized,
{
    let start_time = Local::now();
    let total = specs.len();
    info_time!("Started processing {} queued searches", total);

    let mut dedup = DedupTracker::seed(repo, &IdScope::All).await?;
    let mut runs = Vec::with_capacity(total);
    let mut navigated = false;

    for (idx, spec) in specs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            warn_time!("Cancelled, {} queued searches not started", total - idx);
            break;
        }

        let title = spec.job_title.clone();
        let query = match SearchQuery::try_from(spec.with_defaults(config)) {
            Ok(query) => query,
            Err(e) => {
                warn_time!("Rejected search {}/{} '{}': {}", idx + 1, total, title, e);
                let run = ScrapeRun::rejected(title, &e);
                run.log_summary();
                runs.push(run);
                continue;
            }
        };

        // Only between searches that navigated.
        if navigated && pause(config.query_pause(), cancel).await.is_err() {
            warn_time!("Cancelled, {} queued searches not started", total - idx);
            break;
        }
        navigated = true;

        info_time!("Search {}/{}: '{}'", idx + 1, total, query.job_title());
        let run = Navigator::new(&mut *browser, &mut *gate, repo, &mut dedup, config, cancel)
            .run(&query)
            .await;
        runs.push(run);
    }

    let count = |outcome: RunOutcome| runs.iter().filter(|r| r.outcome == outcome).count();
    info_time!(
        start_time,
        "Finished queue: {} searches run, {} completed, {} partial, {} failed, {} jobs saved",
        runs.len(),
        count(RunOutcome::Completed),
        count(RunOutcome::PartiallyCompleted),
        count(RunOutcome::Failed),
        runs.iter().map(|r| r.persisted).sum::<usize>()
    );

    Ok(runs)
}
