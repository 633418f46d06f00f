use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Strings exactly as they were scraped from one result card.
/// Lives only between the extractor and the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub job_type: Option<String>,
    pub date_posted: Option<String>,
    /// Absolute link to the detail page.
    pub link: String,
    /// Site-assigned key (`jk`).
    pub site_id: String,
}

/// The stored record. Field names are the column names every backend uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub work_setting: WorkSetting,
    pub job_type: JobType,
    pub salary_period: SalaryPeriod,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_min_yearly: Option<f64>,
    pub salary_max_yearly: Option<f64>,
    pub date_posted: Option<NaiveDate>,
    pub date_scraped: DateTime<Utc>,
    pub job_url: String,
    pub search_url: String,
    pub queried_job_title: String,
    pub job_description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkSetting {
    Remote,
    Hybrid,
    Onsite,
    #[default]
    Unknown,
}

impl WorkSetting {
    /// Parses a filter value. `unknown` is not a filter.
    pub fn from_filter(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "remote" => Some(Self::Remote),
            "hybrid" => Some(Self::Hybrid),
            "onsite" | "on-site" | "in-person" => Some(Self::Onsite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Temporary,
    TempToHire,
    Internship,
    Permanent,
    #[default]
    Unknown,
}

impl JobType {
    /// Parses a filter value. `unknown` is not a filter.
    pub fn from_filter(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "full-time" | "fulltime" => Some(Self::FullTime),
            "part-time" | "parttime" => Some(Self::PartTime),
            "contract" => Some(Self::Contract),
            "temporary" => Some(Self::Temporary),
            "temp-to-hire" => Some(Self::TempToHire),
            "internship" => Some(Self::Internship),
            "permanent" => Some(Self::Permanent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalaryPeriod {
    Hourly,
    Weekly,
    Monthly,
    Yearly,
    #[default]
    Unknown,
}

impl SalaryPeriod {
    /// Factor that turns one unit of this period into a yearly figure.
    pub fn yearly_multiplier(self, hours_per_year: f64) -> Option<f64> {
        match self {
            Self::Hourly => Some(hours_per_year),
            Self::Weekly => Some(52.0),
            Self::Monthly => Some(12.0),
            Self::Yearly => Some(1.0),
            Self::Unknown => None,
        }
    }
}
