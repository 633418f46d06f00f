#![allow(dead_code)]

use jobscrap::captcha::{CaptchaGate, CaptchaState, ResumeHandle};
use tokio::sync::watch;
use jobscrap::{QuerySpec, ScraperConfig, SearchQuery};

pub const CHALLENGE: &str = r#"<html><head><title>Just a moment...</title></head>
<body><div id="challenge-form"></div></body></html>"#;

/// A well-formed result card linking to `/viewjob?jk=<jk>`.
pub fn card(jk: &str, title: &str, company: &str) -> String {
    format!(
        r#"<div class="job_seen_beacon">
  <h2 class="jobTitle"><a class="jcs-JobTitle" href="/viewjob?jk={jk}">{title}</a></h2>
  <span data-testid="company-name">{company}</span>
  <div data-testid="text-location">New York, NY 10001</div>
  <div class="salary-snippet-container">$60,000 - $80,000 a year</div>
  <span class="date">Posted 2 days ago</span>
</div>"#
    )
}

/// A card with neither title nor identifier.
pub fn malformed_card() -> String {
    r#"<div class="job_seen_beacon"><span data-testid="company-name">Nameless Inc</span></div>"#
        .to_string()
}

/// `n` cards with ids `<prefix>0`, `<prefix>1`, ...
pub fn cards(prefix: &str, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| card(&format!("{prefix}{i}"), &format!("Data Analyst {i}"), "Acme"))
        .collect()
}

pub fn results_page(cards: &[String]) -> String {
    format!(
        "<html><head><title>Data Analyst Jobs</title></head><body>{}</body></html>",
        cards.concat()
    )
}

/// A full result page that the site marks as the last one: pagination without a next link.
pub fn last_results_page(cards: &[String]) -> String {
    format!(
        r#"<html><head><title>Data Analyst Jobs</title></head><body>{}
<nav aria-label="pagination"><a href="?start=0">1</a></nav></body></html>"#,
        cards.concat()
    )
}

pub fn detail_page(description: &str) -> String {
    format!(
        r#"<html><head><meta itemprop="datePosted" content="2020-03-01"></head>
<body><div id="jobDescriptionText"><p>{description}</p></div></body></html>"#
    )
}

pub fn detail_url(jk: &str) -> String {
    format!("https://www.indeed.com/viewjob?jk={jk}")
}

pub fn config(page_size: usize) -> ScraperConfig {
    ScraperConfig {
        page_size,
        ..ScraperConfig::default()
    }
    .without_delays()
}

pub fn data_analyst_spec(max_pages: u32) -> QuerySpec {
    QuerySpec {
        location: Some("New York, NY".into()),
        search_radius: Some(25),
        max_pages: Some(max_pages),
        days_ago: Some(7),
        ..QuerySpec::titled("Data Analyst")
    }
}

pub fn query(spec: QuerySpec) -> SearchQuery {
    SearchQuery::try_from(spec).unwrap()
}

/// The URL the navigator requests for result page `page`.
pub fn page_url(query: &SearchQuery, config: &ScraperConfig, page: u32) -> String {
    query
        .search_url(&config.base_url, page, config.page_offset_step)
        .unwrap()
        .to_string()
}

pub fn gate(config: &ScraperConfig) -> (CaptchaGate, ResumeHandle) {
    CaptchaGate::from_config(config)
}

/// Plays the operator: resumes each time the gate starts waiting, `times` times over.
pub async fn resume_on_wait(
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
