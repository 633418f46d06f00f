use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::store::{IdScope, JobRepository};
use crate::{info_time, warn_time, Error, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunOutcome {
    #[default]
    InProgress,
    Completed,
    PartiallyCompleted,
    Failed,
}

/// Bookkeeping for one query. Every non-fatal condition has its own counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeRun {
    pub queried_job_title: String,
    pub search_url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_visited: usize,
    pub listings_seen: usize,
    pub persisted: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub page_retries: usize,
    pub description_failures: usize,
    pub challenges_detected: usize,
    pub challenges_unresolved: usize,
    pub outcome: RunOutcome,
    pub reason: Option<String>,
    /// The record whose write failed, when that is what ended the run.
    pub failed_job_id: Option<String>,
}

impl ScrapeRun {
    pub fn start(queried_job_title: impl Into<String>, search_url: impl Into<String>) -> Self {
        Self {
            queried_job_title: queried_job_title.into(),
            search_url: search_url.into(),
            started_at: Utc::now(),
            finished_at: None,
            pages_visited: 0,
            listings_seen: 0,
            persisted: 0,
            duplicates: 0,
            malformed: 0,
            page_retries: 0,
            description_failures: 0,
            challenges_detected: 0,
            challenges_unresolved: 0,
            outcome: RunOutcome::InProgress,
            reason: None,
            failed_job_id: None,
        }
    }

    /// A query rejected before any navigation.
    pub fn rejected(queried_job_title: impl Into<String>, err: &Error) -> Self {
        let mut run = Self::start(queried_job_title, "");
        run.outcome = RunOutcome::Failed;
        run.reason = Some(err.to_string());
        run.finished_at = Some(Utc::now());
        run
    }

    /// Settles the outcome from how the page loop ended. Progress already made is never
    /// thrown away: any error after the first page loaded, and any cancellation, leaves the
    /// run partially completed.
    pub fn finish(&mut self, result: Result<()>) {
        self.finished_at = Some(Utc::now());
        match result {
            Ok(()) => self.outcome = RunOutcome::Completed,
            Err(err) => {
                if let Error::Persistence { job_id, .. } = &err {
                    self.failed_job_id = Some(job_id.clone());
                }
                let made_progress = self.pages_visited > 0 || self.persisted > 0;
                self.outcome = if made_progress || matches!(err, Error::Cancelled) {
                    RunOutcome::PartiallyCompleted
                } else {
                    RunOutcome::Failed
                };
                self.reason = Some(err.to_string());
            }
        }
    }

    pub fn log_summary(&self) {
        let summary = format!(
            "{:?} '{}': pages {}, seen {}, saved {}, duplicates {}, malformed {}, retries {}, \
             description failures {}, challenges {} ({} unresolved resumes)",
            self.outcome,
            self.queried_job_title,
            self.pages_visited,
            self.listings_seen,
            self.persisted,
            self.duplicates,
            self.malformed,
            self.page_retries,
            self.description_failures,
            self.challenges_detected,
            self.challenges_unresolved,
        );
        match (&self.outcome, &self.reason) {
            (RunOutcome::Completed, _) | (_, None) => info_time!("{summary}"),
            (_, Some(reason)) => warn_time!("{summary}; reason: {reason}"),
        }
    }
}

/// Ids already stored, for the lifetime of one queue invocation.
#[derive(Debug, Clone, Default)]
pub struct DedupTracker {
    known: HashSet<String>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from what the repository already holds, so a rerun of the same queue writes nothing new.
    pub async fn seed<R: JobRepository + ?Sized>(repo: &R, scope: &IdScope) -> Result<Self> {
        let known = repo.list_existing_ids(scope).await?;
        info_time!("Dedup seeded with {} stored job ids", known.len());
        Ok(Self { known })
    }

    pub fn is_known(&self, job_id: &str) -> bool {
        self.known.contains(job_id)
    }

    /// Records a persisted id. Returns `false` if it was already known.
    pub fn mark(&mut self, job_id: impl Into<String>) -> bool {
        self.known.insert(job_id.into())
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_rules() {
        let mut run = ScrapeRun::start("Analyst", "u");
        run.finish(Ok(()));
        assert_eq!(run.outcome, RunOutcome::Completed);

        let mut run = ScrapeRun::start("Analyst", "u");
        run.finish(Err(Error::TransientPageFailure { url: "u".into(), attempts: 3 }));
        assert_eq!(run.outcome, RunOutcome::Failed);

        let mut run = ScrapeRun::start("Analyst", "u");
        run.pages_visited = 1;
        run.finish(Err(Error::TransientPageFailure { url: "u".into(), attempts: 3 }));
        assert_eq!(run.outcome, RunOutcome::PartiallyCompleted);

        let mut run = ScrapeRun::start("Analyst", "u");
        run.finish(Err(Error::Cancelled));
        assert_eq!(run.outcome, RunOutcome::PartiallyCompleted);

        let mut run = ScrapeRun::start("Analyst", "u");
        run.pages_visited = 1;
        run.finish(Err(Error::Persistence { job_id: "j1".into(), reason: "disk full".into() }));
        assert_eq!(run.outcome, RunOutcome::PartiallyCompleted);
        assert_eq!(run.failed_job_id.as_deref(), Some("j1"));
    }

    #[test]
    fn rejected_query_is_failed() {
        let run = ScrapeRun::rejected("", &Error::InvalidQuery("job title is empty".into()));
        assert_eq!(run.outcome, RunOutcome::Failed);
        assert_eq!(run.pages_visited, 0);
        assert!(run.reason.unwrap().contains("job title is empty"));
    }

    #[test]
    fn dedup_marks_once() {
        let mut dedup = DedupTracker::new();
        assert!(dedup.mark("a"));
        assert!(!dedup.mark("a"));
        assert!(dedup.is_known("a"));
        assert_eq!(dedup.len(), 1);
    }
}
