use scraper::{ElementRef, Html, Selector};
use tokio::task::spawn_blocking;
use url::Url;

use crate::listing::RawListing;
use crate::{Error, Result};

/// Card containers, tried in turn. The site A/B tests its markup, so whichever selector
/// finds the most cards wins.
const CARD_SELECTORS: &[&str] = &[
    "div.tapItem",
    "div.job_seen_beacon",
    "div[class*='job_seen_beacon']",
    "ul.jobsearch-ResultsList > li",
    "[data-testid='jobListing']",
    "div[id^='jobCard']",
];

const TITLE: [&str; 2] = ["a.jcs-JobTitle", "h2.jobTitle span[title]"];
const COMPANY: [&str; 2] = ["[data-testid='company-name']", "span.companyName"];
const LINK: [&str; 2] = ["a.jcs-JobTitle", "h2.jobTitle a"];
const LOCATION: [&str; 2] = ["[data-testid='text-location']", "div.companyLocation"];
const SALARY: [&str; 2] = ["div[class*='salary-snippet-container']", "div.salary-snippet-container"];
const DATE: [&str; 2] = ["span.date", "span[class*='date']"];
const JOB_TYPE: [&str; 2] = [
    "div[data-testid='job-type-info']",
    "div.metadataContainer span.attribute_snippet",
];
const DATA_JK: &str = "a[data-jk]";

const NO_RESULTS: &str = "div.jobsearch-NoResult-messageContainer, [data-testid='no-results']";
const PAGINATION: &str = "nav[aria-label='pagination']";
const NEXT_PAGE: &str = "a[data-testid='pagination-page-next']";

const DESCRIPTION: &[&str] = &[
    "#jobDescriptionText",
    "[data-testid='jobDescriptionText']",
    "div.jobsearch-jobDescriptionText",
    "div.job-description",
];
const DATE_META: &str = "meta[itemprop='datePosted'], meta[property='datePosted'], \
                         meta[name='date'], meta[property='article:published_time']";
const LD_JSON: &str = "script[type='application/ld+json']";
const DETAILS_SECTION: &str = "#jobDetailsSection, [data-testid='jobDetails']";

/// What one search result page yielded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Well-formed cards in presentation order.
    pub listings: Vec<RawListing>,
    /// Cards located, well-formed or not. Compared against the nominal page size.
    pub cards_found: usize,
    /// Cards missing a title, company or identifier.
    pub malformed: usize,
    pub no_more_results: bool,
}

/// Extra fields only the detail page carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailPage {
    pub description: Option<String>,
    pub date_posted: Option<String>,
    pub job_type: Option<String>,
    pub work_setting: Option<String>,
}

/// Parses a result page off the async runtime.
pub(crate) async fn parse_result_page(html: String, page_url: Url) -> Result<ResultPage> {
    let page = spawn_blocking(move || extract_listings(&html, &page_url)).await??;
    Ok(page)
}

/// Parses a detail page off the async runtime.
pub(crate) async fn parse_detail_page(html: String) -> Result<DetailPage> {
    let detail = spawn_blocking(move || extract_detail(&html)).await??;
    Ok(detail)
}

/// Pulls every listing card out of a result page. A card missing a required field is counted
/// in `malformed` and skipped.
pub fn extract_listings(html: &str, page_url: &Url) -> Result<ResultPage> {
    let doc = Html::parse_document(html);

    let mut cards: Vec<ElementRef> = Vec::new();
    for sel_str in CARD_SELECTORS {
        let found: Vec<ElementRef> = doc.select(&create_selector(sel_str)?).collect();
        if found.len() > cards.len() {
            cards = found;
        }
    }

    let fields = CardSelectors::new()?;
    let mut page = ResultPage {
        listings: Vec::with_capacity(cards.len()),
        cards_found: cards.len(),
        ..ResultPage::default()
    };
    for card in cards {
        match fields.read_card(card, page_url) {
            Some(listing) => page.listings.push(listing),
            None => page.malformed += 1,
        }
    }

    let no_results = doc.select(&create_selector(NO_RESULTS)?).next().is_some();
    let has_pagination = doc.select(&create_selector(PAGINATION)?).next().is_some();
    let has_next = doc.select(&create_selector(NEXT_PAGE)?).next().is_some();
    page.no_more_results = no_results || (has_pagination && !has_next);

    Ok(page)
}

/// Reads description, exact posting date and the job-details section of a detail page.
pub fn extract_detail(html: &str) -> Result<DetailPage> {
    let doc = Html::parse_document(html);
    let mut detail = DetailPage::default();

    for sel_str in DESCRIPTION {
        if let Some(el) = doc.select(&create_selector(sel_str)?).next() {
            let text = block_text(el);
            if !text.is_empty() {
                detail.description = Some(text);
                break;
            }
        }
    }

    detail.date_posted = doc
        .select(&create_selector(DATE_META)?)
        .filter_map(|el| el.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(String::from);
    if detail.date_posted.is_none() {
        detail.date_posted = doc
            .select(&create_selector(LD_JSON)?)
            .find_map(|el| ld_json_date(&el.inner_html()));
    }

    if let Some(section) = doc.select(&create_selector(DETAILS_SECTION)?).next() {
        let heading_sel = create_selector("h3")?;
        let value_sel = create_selector("li, span")?;
        for heading in section.select(&heading_sel) {
            let label = inline_text(heading).to_lowercase();
            let Some(value) = heading
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(|group| {
                    group
                        .select(&value_sel)
                        .map(inline_text)
                        .find(|t| !t.is_empty() && !label.contains(&t.to_lowercase()))
                })
            else {
                continue;
            };
            if label.contains("job type") {
                detail.job_type = Some(value);
            } else if label.contains("work setting") {
                detail.work_setting = Some(value);
            }
        }
    }

    Ok(detail)
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseInvalidSelector(sel_str.into()))
}

struct CardSelectors {
    title: [Selector; 2],
    company: [Selector; 2],
    link: [Selector; 2],
    location: [Selector; 2],
    salary: [Selector; 2],
    date: [Selector; 2],
    job_type: [Selector; 2],
    data_jk: Selector,
}

impl CardSelectors {
    fn new() -> Result<Self> {
        let pair = |[primary, backup]: [&str; 2]| -> Result<[Selector; 2]> {
            Ok([create_selector(primary)?, create_selector(backup)?])
        };
        Ok(Self {
            title: pair(TITLE)?,
            company: pair(COMPANY)?,
            link: pair(LINK)?,
            location: pair(LOCATION)?,
            salary: pair(SALARY)?,
            date: pair(DATE)?,
            job_type: pair(JOB_TYPE)?,
            data_jk: create_selector(DATA_JK)?,
        })
    }

    fn read_card(&self, card: ElementRef, page_url: &Url) -> Option<RawListing> {
        let title = first(card, &self.title)
            .map(|el| match el.value().attr("title") {
                Some(attr) if !attr.trim().is_empty() => attr.trim().to_string(),
                _ => inline_text(el),
            })
            .filter(|t| !t.is_empty())?;
        let company = self.text(card, &self.company)?;

        let link = first(card, &self.link)
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| page_url.join(href).ok());
        let site_id = link
            .as_ref()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "jk")
                    .map(|(_, value)| value.into_owned())
            })
            .or_else(|| card.value().attr("data-jk").map(String::from))
            .or_else(|| {
                card.select(&self.data_jk)
                    .find_map(|el| el.value().attr("data-jk"))
                    .map(String::from)
            })
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))?;
        let link = match link {
            Some(url) => url.to_string(),
            None => page_url.join(&format!("/viewjob?jk={site_id}")).ok()?.to_string(),
        };

        Some(RawListing {
            title,
            company,
            location: self.text(card, &self.location),
            salary: self.text(card, &self.salary),
            job_type: self.text(card, &self.job_type),
            date_posted: self.text(card, &self.date),
            link,
            site_id,
        })
    }

    fn text(&self, card: ElementRef, selectors: &[Selector; 2]) -> Option<String> {
        first(card, selectors)
            .map(inline_text)
            .filter(|t| !t.is_empty())
    }
}

/// First match of the primary selector, else of the backup.
#[inline]
fn first<'a>(card: ElementRef<'a>, selectors: &[Selector; 2]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|sel| card.select(sel).next())
}

/// All text of an element on one line, whitespace collapsed.
fn inline_text(el: ElementRef) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of a block element with one line per text node and no blank runs.
fn block_text(el: ElementRef) -> String {
    el.text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn ld_json_date(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    items.iter().find_map(|item| {
        ["datePosted", "datePublished"]
            .iter()
            .find_map(|key| item.get(key).and_then(|v| v.as_str()))
            .map(String::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://www.indeed.com/jobs?q=Data+Analyst").unwrap()
    }

    const RESULTS: &str = r#"
        <html><body><ul class="jobsearch-ResultsList">
          <li><div class="job_seen_beacon">
            <h2 class="jobTitle"><a class="jcs-JobTitle" href="/rc/clk?jk=aaa111&amp;from=serp">
              <span title="Data Analyst">Data Analyst</span></a></h2>
            <span data-testid="company-name">Acme Corp</span>
            <div data-testid="text-location">New York, NY 10001</div>
            <div class="salary-snippet-container">$60,000 - $80,000 a year</div>
            <div data-testid="job-type-info">Full-time</div>
            <span class="date">Posted 3 days ago</span>
          </div></li>
          <li><div class="job_seen_beacon" data-jk="bbb222">
            <h2 class="jobTitle"><span title="Senior Analyst">Senior Analyst</span></h2>
            <span class="companyName">Globex</span>
          </div></li>
          <li><div class="job_seen_beacon">
            <h2 class="jobTitle"><a class="jcs-JobTitle" href="/rc/clk?from=serp">No Id Here</a></h2>
            <span class="companyName">Initech</span>
          </div></li>
        </ul>
        <nav aria-label="pagination"><a data-testid="pagination-page-next" href="?start=10">Next</a></nav>
        </body></html>"#;

    #[test]
    fn cards_in_page_order() {
        let page = extract_listings(RESULTS, &page_url()).unwrap();
        assert_eq!(page.cards_found, 3);
        assert_eq!(page.malformed, 1);
        assert!(!page.no_more_results);

        let first = &page.listings[0];
        assert_eq!(first.title, "Data Analyst");
        assert_eq!(first.company, "Acme Corp");
        assert_eq!(first.site_id, "aaa111");
        assert_eq!(first.link, "https://www.indeed.com/rc/clk?jk=aaa111&from=serp");
        assert_eq!(first.location.as_deref(), Some("New York, NY 10001"));
        assert_eq!(first.salary.as_deref(), Some("$60,000 - $80,000 a year"));
        assert_eq!(first.job_type.as_deref(), Some("Full-time"));
        assert_eq!(first.date_posted.as_deref(), Some("Posted 3 days ago"));

        let second = &page.listings[1];
        assert_eq!(second.site_id, "bbb222");
        assert_eq!(second.link, "https://www.indeed.com/viewjob?jk=bbb222");
        assert_eq!(second.salary, None);
    }

    #[test]
    fn end_of_results_markers() {
        let last = r#"<div class="job_seen_beacon"></div><nav aria-label="pagination"><a href="?start=0">1</a></nav>"#;
        assert!(extract_listings(last, &page_url()).unwrap().no_more_results);

        let empty = r#"<div class="jobsearch-NoResult-messageContainer">No jobs</div>"#;
        let page = extract_listings(empty, &page_url()).unwrap();
        assert!(page.no_more_results);
        assert_eq!(page.cards_found, 0);

        let bare = r#"<div class="job_seen_beacon"></div>"#;
        assert!(!extract_listings(bare, &page_url()).unwrap().no_more_results);
    }

    #[test]
    fn detail_page_fields() {
        let html = r#"<html><head>
            <meta itemprop="datePosted" content="2024-03-01T09:00:00Z">
          </head><body>
            <div id="jobDetailsSection">
              <div><h3>Job type</h3><ul><li>Contract</li></ul></div>
              <div><h3>Work setting</h3><ul><li>Hybrid work</li></ul></div>
            </div>
            <div id="jobDescriptionText"><p>Analyze   data.</p><ul><li>SQL</li><li>Python</li></ul></div>
          </body></html>"#;
        let detail = extract_detail(html).unwrap();
        assert_eq!(detail.description.as_deref(), Some("Analyze data.\nSQL\nPython"));
        assert_eq!(detail.date_posted.as_deref(), Some("2024-03-01T09:00:00Z"));
        assert_eq!(detail.job_type.as_deref(), Some("Contract"));
        assert_eq!(detail.work_setting.as_deref(), Some("Hybrid work"));
    }

    #[test]
    fn detail_date_from_ld_json() {
        let html = r#"<script type="application/ld+json">
            [{"@type": "JobPosting", "datePosted": "2024-02-20"}]
        </script><div class="job-description">Hi</div>"#;
        let detail = extract_detail(html).unwrap();
        assert_eq!(detail.date_posted.as_deref(), Some("2024-02-20"));
        assert_eq!(detail.description.as_deref(), Some("Hi"));
        assert_eq!(detail.job_type, None);
    }
}
