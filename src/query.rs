use serde::{Deserialize, Serialize};
use url::Url;

use crate::listing::{JobType, WorkSetting};
use crate::{Error, Result, ScraperConfig, DEFAULT_DAYS_AGO, DEFAULT_MAX_PAGES, DEFAULT_RADIUS};

const REMOTE_FILTER: &str = "032b3046-06a3-4876-8dfd-474eb5e7ed11";
const HYBRID_ATTR: &str = "attr(DSQF7)";
const TEMP_TO_HIRE_ATTR: &str = "attr(7SBAT)";

/// One queue entry as written by a user, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    pub job_title: String,
    pub location: Option<String>,
    pub search_radius: Option<u32>,
    pub max_pages: Option<u32>,
    pub days_ago: Option<u32>,
    pub work_setting: Option<String>,
    pub job_type: Option<String>,
    pub fetch_descriptions: bool,
}

impl QuerySpec {
    pub fn titled(job_title: impl Into<String>) -> Self {
        Self {
            job_title: job_title.into(),
            ..Self::default()
        }
    }

    /// Fills what the entry leaves unset from `config`. Radius is only filled around a location.
    pub fn with_defaults(mut self, config: &ScraperConfig) -> Self {
        if self.location.is_some() {
            self.search_radius.get_or_insert(config.default_radius);
        }
        self.max_pages.get_or_insert(config.default_max_pages);
        self.days_ago.get_or_insert(config.default_days_ago);
        self
    }
}

/// Posting-age window the site can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recency {
    Any,
    Last1,
    Last3,
    Last7,
    Last14,
}

impl Recency {
    pub fn from_days(days: u32) -> Option<Self> {
        match days {
            0 => Some(Self::Any),
            1 => Some(Self::Last1),
            3 => Some(Self::Last3),
            7 => Some(Self::Last7),
            14 => Some(Self::Last14),
            _ => None,
        }
    }

    pub fn days(self) -> u32 {
        match self {
            Self::Any => 0,
            Self::Last1 => 1,
            Self::Last3 => 3,
            Self::Last7 => 7,
            Self::Last14 => 14,
        }
    }
}

/// A validated search. Fields are private so a query cannot change once a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    job_title: String,
    location: Option<String>,
    radius: Option<u32>,
    max_pages: u32,
    recency: Recency,
    work_setting: Option<WorkSetting>,
    job_type: Option<JobType>,
    fetch_descriptions: bool,
}

impl TryFrom<QuerySpec> for SearchQuery {
    type Error = Error;

    fn try_from(spec: QuerySpec) -> Result<Self> {
        let job_title = spec.job_title.trim().to_string();
        if job_title.is_empty() {
            return Err(Error::InvalidQuery("job title is empty".into()));
        }

        let location = spec
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        // Radius only means something around a location.
        let radius = match (&location, spec.search_radius) {
            (_, Some(0)) => return Err(Error::InvalidQuery("search radius must be positive".into())),
            (Some(_), radius) => Some(radius.unwrap_or(DEFAULT_RADIUS)),
            (None, _) => None,
        };

        let max_pages = spec.max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        if max_pages == 0 {
            return Err(Error::InvalidQuery("max pages must be positive".into()));
        }

        let days = spec.days_ago.unwrap_or(DEFAULT_DAYS_AGO);
        let recency = Recency::from_days(days).ok_or_else(|| {
            Error::InvalidQuery(format!("days ago must be one of 0, 1, 3, 7, 14; got {days}"))
        })?;

        let work_setting = spec
            .work_setting
            .as_deref()
            .map(|s| {
                WorkSetting::from_filter(s)
                    .ok_or_else(|| Error::InvalidQuery(format!("unknown work setting: {s}")))
            })
            .transpose()?;
        let job_type = spec
            .job_type
            .as_deref()
            .map(|s| {
                JobType::from_filter(s)
                    .ok_or_else(|| Error::InvalidQuery(format!("unknown job type: {s}")))
            })
            .transpose()?;

        Ok(Self {
            job_title,
            location,
            radius,
            max_pages,
            recency,
            work_setting,
            job_type,
            fetch_descriptions: spec.fetch_descriptions,
        })
    }
}

impl SearchQuery {
    pub fn job_title(&self) -> &str {
        &self.job_title
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn radius(&self) -> Option<u32> {
        self.radius
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn recency(&self) -> Recency {
        self.recency
    }

    pub fn work_setting(&self) -> Option<WorkSetting> {
        self.work_setting
    }

    pub fn job_type(&self) -> Option<JobType> {
        self.job_type
    }

    pub fn fetch_descriptions(&self) -> bool {
        self.fetch_descriptions
    }

    /// Result page `page` (0-based) for this query. Every filter is a request parameter;
    /// nothing is filtered after the fact.
    pub fn search_url(&self, base: &str, page: u32, offset_step: usize) -> Result<Url> {
        let mut url = Url::parse(base)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &self.job_title);
            if let Some(location) = &self.location {
                pairs.append_pair("l", location);
                if let Some(radius) = self.radius {
                    pairs.append_pair("radius", &radius.to_string());
                }
            }
            if self.recency != Recency::Any {
                pairs.append_pair("fromage", &self.recency.days().to_string());
            }
            if self.work_setting == Some(WorkSetting::Remote) {
                pairs.append_pair("remotejob", REMOTE_FILTER);
            }
            if let Some(jt) = self.job_type.and_then(job_type_param) {
                pairs.append_pair("jt", jt);
            }

            let mut attrs = Vec::new();
            if self.work_setting == Some(WorkSetting::Hybrid) {
                attrs.push(HYBRID_ATTR);
            }
            if self.job_type == Some(JobType::TempToHire) {
                attrs.push(TEMP_TO_HIRE_ATTR);
            }
            if !attrs.is_empty() {
                pairs.append_pair("sc", &format!("0kf:{};", attrs.concat()));
            }

            if page > 0 {
                pairs.append_pair("start", &(page as usize * offset_step).to_string());
            }
        }
        Ok(url)
    }
}

fn job_type_param(job_type: JobType) -> Option<&'static str> {
    match job_type {
        JobType::FullTime => Some("fulltime"),
        JobType::PartTime => Some("parttime"),
        JobType::Contract => Some("contract"),
        JobType::Temporary => Some("temporary"),
        JobType::Internship => Some("internship"),
        JobType::Permanent => Some("permanent"),
        JobType::TempToHire | JobType::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.indeed.com/jobs";

    fn query(spec: QuerySpec) -> SearchQuery {
        SearchQuery::try_from(spec).unwrap()
    }

    #[test]
    fn basic_url() {
        let url = query(QuerySpec::titled("Software Engineer")).search_url(BASE, 0, 10).unwrap();
        assert_eq!(url.as_str(), "https://www.indeed.com/jobs?q=Software+Engineer&fromage=7");
    }

    #[test]
    fn location_brings_default_radius() {
        let mut spec = QuerySpec::titled("Data Analyst");
        spec.location = Some("New York, NY".into());
        let url = query(spec).search_url(BASE, 0, 10).unwrap();
        assert!(url.as_str().contains("&l=New+York%2C+NY&radius=25"));
    }

    #[test]
    fn radius_without_location_is_dropped() {
        let mut spec = QuerySpec::titled("Developer");
        spec.search_radius = Some(50);
        let q = query(spec);
        assert_eq!(q.radius(), None);
        assert!(!q.search_url(BASE, 0, 10).unwrap().as_str().contains("radius"));
    }

    #[test]
    fn filters_become_parameters() {
        let mut spec = QuerySpec::titled("Nurse");
        spec.days_ago = Some(0);
        spec.work_setting = Some("hybrid".into());
        spec.job_type = Some("temp-to-hire".into());
        let url = query(spec).search_url(BASE, 2, 10).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(!pairs.iter().any(|(k, _)| k == "fromage"));
        assert!(pairs.contains(&("sc".into(), "0kf:attr(DSQF7)attr(7SBAT);".into())));
        assert!(pairs.contains(&("start".into(), "20".into())));

        let mut spec = QuerySpec::titled("Nurse");
        spec.work_setting = Some("remote".into());
        spec.job_type = Some("full-time".into());
        let url = query(spec).search_url(BASE, 0, 10).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("remotejob".into(), REMOTE_FILTER.into())));
        assert!(pairs.contains(&("jt".into(), "fulltime".into())));
    }

    #[test]
    fn config_defaults_fill_gaps() {
        let config = ScraperConfig {
            default_radius: 10,
            default_max_pages: 5,
            default_days_ago: 14,
            ..ScraperConfig::default()
        };
        let mut spec = QuerySpec::titled("Welder");
        spec.max_pages = Some(2);
        let filled = spec.clone().with_defaults(&config);
        assert_eq!(filled.search_radius, None);
        assert_eq!(filled.max_pages, Some(2));
        assert_eq!(filled.days_ago, Some(14));

        spec.location = Some("Austin, TX".into());
        assert_eq!(spec.with_defaults(&config).search_radius, Some(10));
    }

    #[test]
    fn invalid_queries_fail_fast() {
        assert!(matches!(SearchQuery::try_from(QuerySpec::titled("  ")), Err(Error::InvalidQuery(_))));

        let mut spec = QuerySpec::titled("Analyst");
        spec.max_pages = Some(0);
        assert!(SearchQuery::try_from(spec).is_err());

        let mut spec = QuerySpec::titled("Analyst");
        spec.days_ago = Some(5);
        assert!(SearchQuery::try_from(spec).is_err());

        let mut spec = QuerySpec::titled("Analyst");
        spec.work_setting = Some("moon base".into());
        assert!(SearchQuery::try_from(spec).is_err());

        let mut spec = QuerySpec::titled("Analyst");
        spec.location = Some("Boston".into());
        spec.search_radius = Some(0);
        assert!(SearchQuery::try_from(spec).is_err());
    }
}
