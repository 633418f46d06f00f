//! Pure text-to-value conversions for scraped card fields.
//!
//! Nothing here touches the network or the clock: relative dates are resolved against an
//! `as_of` date supplied by the caller, so the same input always yields the same record.

use std::sync::OnceLock;

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use regex::Regex;

use crate::listing::{JobType, NormalizedListing, RawListing, SalaryPeriod, WorkSetting};
use crate::query::SearchQuery;
use crate::HOURS_PER_YEAR;

#[inline]
fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern compiles"))
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Salary {
    pub period: SalaryPeriod,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Reads `"$60,000 - $80,000 a year"`, `"$25/hr"`, `"$55K a year"` and the like.
/// A single figure gives `min == max`. Text without any figure gives an unknown period.
/// Figures without a period qualifier are taken as yearly.
pub fn parse_salary(text: &str) -> Salary {
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    let amount_re = regex(&AMOUNT, r"(\$)?\s?(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?([kK])?\b");

    // (has currency sign, value, end offset in `text`)
    let mut amounts: Vec<(bool, f64, usize)> = Vec::new();
    for cap in amount_re.captures_iter(text) {
        let whole = cap[2].replace(',', "");
        let frac = cap.get(3).map_or("", |m| m.as_str());
        let Ok(mut value) = format!("{whole}{frac}").parse::<f64>() else {
            continue;
        };
        if cap.get(4).is_some() {
            value *= 1_000.0;
        }
        amounts.push((cap.get(1).is_some(), value, cap.get(0).map_or(0, |m| m.end())));
    }
    // Once any figure carries a currency sign, bare numbers ("40 hours") are noise.
    if amounts.iter().any(|(dollar, _, _)| *dollar) {
        amounts.retain(|(dollar, _, _)| *dollar);
    }
    let Some(pay_end) = amounts.iter().map(|(_, _, end)| *end).max() else {
        return Salary::default();
    };

    let min = amounts.iter().map(|(_, v, _)| *v).fold(f64::INFINITY, f64::min);
    let max = amounts.iter().map(|(_, v, _)| *v).fold(f64::NEG_INFINITY, f64::max);

    Salary {
        period: salary_period(text, pay_end),
        min: Some(min),
        max: Some(max),
    }
}

/// The period qualifying the pay figures that end at `pay_end`. The first qualifier after the
/// figures wins, so "40 hrs/week" next to "$60,000 a year" stays yearly.
fn salary_period(text: &str, pay_end: usize) -> SalaryPeriod {
    static QUALIFIER: OnceLock<Regex> = OnceLock::new();
    static ADVERB: OnceLock<Regex> = OnceLock::new();

    let qualifier_re = regex(
        &QUALIFIER,
        r"(?i)(?:\ban?\b|\bper\b|/)\s*(hour|hr|week|wk|month|mo|year|yr|annum)s?\b",
    );
    let qualifiers: Vec<_> = qualifier_re.captures_iter(text).collect();
    let unit = qualifiers
        .iter()
        .find(|cap| cap.get(0).is_some_and(|m| m.start() >= pay_end))
        .or_else(|| qualifiers.first())
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .or_else(|| {
            regex(&ADVERB, r"(?i)\b(hourly|weekly|monthly|yearly|annually)\b")
                .captures(text)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str().to_lowercase())
        });

    match unit.as_deref() {
        Some("hour" | "hr" | "hourly") => SalaryPeriod::Hourly,
        Some("week" | "wk" | "weekly") => SalaryPeriod::Weekly,
        Some("month" | "mo" | "monthly") => SalaryPeriod::Monthly,
        _ => SalaryPeriod::Yearly,
    }
}

/// Converts an amount to its yearly equivalent using the default 2080 hours a year.
pub fn to_yearly(period: SalaryPeriod, value: f64) -> Option<f64> {
    to_yearly_with(period, value, HOURS_PER_YEAR)
}

pub fn to_yearly_with(period: SalaryPeriod, value: f64, hours_per_year: f64) -> Option<f64> {
    period.yearly_multiplier(hours_per_year).map(|m| value * m)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

/// Strips the decorations the site adds around a place name
/// (`Remote in`, `Hybrid work in`, parentheticals, `+3 locations`, `, United States`).
/// A plain `Remote` cleans to an empty string.
pub fn clean_location(text: &str) -> String {
    static REMOTE_IN: OnceLock<Regex> = OnceLock::new();
    static IN: OnceLock<Regex> = OnceLock::new();
    static PARENS: OnceLock<Regex> = OnceLock::new();
    static MORE_LOCATIONS: OnceLock<Regex> = OnceLock::new();
    static COUNTRY: OnceLock<Regex> = OnceLock::new();
    static SPACES: OnceLock<Regex> = OnceLock::new();

    let text = text.trim();
    if text.is_empty() {
        return String::new();
    }

    let place = if text.to_lowercase().starts_with("remote") {
        match regex(&REMOTE_IN, r"(?i)^remote\s+in\s+(.*)$").captures(text) {
            Some(cap) => cap[1].to_string(),
            None => return String::new(),
        }
    } else if let Some(cap) = regex(&IN, r"(?i)\sin\s+(.*)$").captures(text) {
        cap[1].to_string()
    } else {
        text.to_string()
    };

    let place = regex(&PARENS, r"\(.*?\)").replace_all(&place, "");
    let place = regex(&MORE_LOCATIONS, r"(?i)\+\d+\s+locations?").replace_all(&place, "");
    let place = regex(&COUNTRY, r",\s*United States$").replace_all(place.trim(), "");
    regex(&SPACES, r"\s+")
        .replace_all(&place, " ")
        .trim()
        .to_string()
}

/// Splits a location into city, state and ZIP. Parts that cannot be recognized stay `None`.
pub fn parse_location(text: &str) -> Location {
    static CITY_STATE: OnceLock<Regex> = OnceLock::new();
    static STATE_ONLY: OnceLock<Regex> = OnceLock::new();
    static ZIP_ONLY: OnceLock<Regex> = OnceLock::new();

    let cleaned = clean_location(text);
    if cleaned.is_empty() {
        return Location::default();
    }

    if let Some(cap) = regex(&ZIP_ONLY, r"^(\d{5}(?:-\d{4})?)$").captures(&cleaned) {
        return Location {
            zip: Some(cap[1].to_string()),
            ..Location::default()
        };
    }

    if let Some(cap) = regex(
        &CITY_STATE,
        r"([^,]+),\s*([A-Z]{2})\b(?:\s+(\d{5}(?:-\d{4})?))?",
    )
    .captures(&cleaned)
    {
        return Location {
            city: Some(cap[1].trim().to_string()),
            state: Some(cap[2].to_string()),
            zip: cap.get(3).map(|m| m.as_str().to_string()),
        };
    }

    if let Some(cap) = regex(&STATE_ONLY, r"^([A-Z]{2})(?:\s+(\d{5}(?:-\d{4})?))?$").captures(&cleaned) {
        return Location {
            state: Some(cap[1].to_string()),
            zip: cap.get(2).map(|m| m.as_str().to_string()),
            ..Location::default()
        };
    }

    Location::default()
}

/// Resolves "Posted 3 days ago", "Today", "Just posted", "30+ days ago" or an absolute date
/// against `as_of`. Unrecognized text and dates after `as_of` give `None`.
pub fn parse_relative_date(text: &str, as_of: NaiveDate) -> Option<NaiveDate> {
    static AGO: OnceLock<Regex> = OnceLock::new();
    static ISO: OnceLock<Regex> = OnceLock::new();
    static SLASHED: OnceLock<Regex> = OnceLock::new();
    static NAMED: OnceLock<Regex> = OnceLock::new();

    let lower = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if lower.contains("just posted") || lower.contains("today") || lower.contains("just now") {
        return Some(as_of);
    }
    if lower.contains("yesterday") {
        return as_of.checked_sub_days(Days::new(1));
    }

    if let Some(cap) = regex(&AGO, r"(\d+)\+?\s*(minute|min|hour|hr|day|week|month)s?\s+ago")
        .captures(&lower)
    {
        let n: u64 = cap[1].parse().ok()?;
        let days = match &cap[2] {
            "day" => n,
            "week" => n.checked_mul(7)?,
            "month" => n.checked_mul(30)?,
            _ => 0,
        };
        return as_of.checked_sub_days(Days::new(days));
    }

    let absolute = if let Some(cap) = regex(&ISO, r"(\d{4}-\d{2}-\d{2})").captures(text) {
        NaiveDate::parse_from_str(&cap[1], "%Y-%m-%d").ok()
    } else if let Some(cap) = regex(&SLASHED, r"(\d{1,2}/\d{1,2}/\d{4})").captures(text) {
        NaiveDate::parse_from_str(&cap[1], "%m/%d/%Y").ok()
    } else if let Some(cap) = regex(&NAMED, r"([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})").captures(text) {
        let joined = format!("{} {} {}", &cap[1], &cap[2], &cap[3]);
        NaiveDate::parse_from_str(&joined, "%B %d %Y")
            .or_else(|_| NaiveDate::parse_from_str(&joined, "%b %d %Y"))
            .ok()
    } else {
        None
    };

    absolute.filter(|date| *date <= as_of)
}

/// Work setting mentioned in free text, if any.
pub fn parse_work_setting(text: &str) -> Option<WorkSetting> {
    let lower = text.to_lowercase();
    if lower.contains("remote") {
        Some(WorkSetting::Remote)
    } else if lower.contains("hybrid") {
        Some(WorkSetting::Hybrid)
    } else if ["in-person", "in person", "on-site", "onsite", "on site"]
        .iter()
        .any(|p| lower.contains(p))
    {
        Some(WorkSetting::Onsite)
    } else {
        None
    }
}

/// Maps the many spellings of a job type onto `JobType`. Only the part before a `·` counts.
pub fn parse_job_type(text: &str) -> JobType {
    const VARIANTS: &[(&str, JobType)] = &[
        ("temp to hire", JobType::TempToHire),
        ("temp-to-hire", JobType::TempToHire),
        ("temptohire", JobType::TempToHire),
        ("full time", JobType::FullTime),
        ("full-time", JobType::FullTime),
        ("fulltime", JobType::FullTime),
        ("part time", JobType::PartTime),
        ("part-time", JobType::PartTime),
        ("parttime", JobType::PartTime),
        ("contract", JobType::Contract),
        ("temporary", JobType::Temporary),
        ("temp", JobType::Temporary),
        ("permanent", JobType::Permanent),
        ("intern", JobType::Internship),
    ];

    let head = text.split('·').next().unwrap_or_default().to_lowercase();
    VARIANTS
        .iter()
        .find(|(needle, _)| head.contains(needle))
        .map_or(JobType::Unknown, |(_, job_type)| *job_type)
}

/// Everything a card needs besides its own text to become a record.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeContext<'a> {
    pub query: &'a SearchQuery,
    pub search_url: &'a str,
    pub scraped_at: DateTime<Utc>,
    pub hours_per_year: f64,
}

/// Builds the stored record for one card. Returns `None` when the card has no identifier
/// or no title, since such a card cannot be deduplicated.
pub fn normalize(raw: RawListing, ctx: &NormalizeContext<'_>) -> Option<NormalizedListing> {
    let job_id = raw.site_id.trim();
    let title = raw.title.trim();
    if job_id.is_empty() || title.is_empty() {
        return None;
    }

    let salary = raw.salary.as_deref().map(parse_salary).unwrap_or_default();
    let location = raw.location.as_deref().map(parse_location).unwrap_or_default();
    let work_setting = raw
        .location
        .as_deref()
        .and_then(parse_work_setting)
        .or(ctx.query.work_setting())
        .unwrap_or_default();
    let job_type = raw
        .job_type
        .as_deref()
        .map(parse_job_type)
        .filter(|job_type| *job_type != JobType::Unknown)
        .or(ctx.query.job_type())
        .unwrap_or_default();
    let as_of = ctx.scraped_at.with_timezone(&Local).date_naive();
    let yearly = |value: Option<f64>| {
        value.and_then(|v| to_yearly_with(salary.period, v, ctx.hours_per_year))
    };

    Some(NormalizedListing {
        job_id: job_id.to_string(),
        title: title.to_string(),
        company: raw.company.trim().to_string(),
        city: location.city,
        state: location.state,
        zip: location.zip,
        work_setting,
        job_type,
        salary_period: salary.period,
        salary_min: salary.min,
        salary_max: salary.max,
        salary_min_yearly: yearly(salary.min),
        salary_max_yearly: yearly(salary.max),
        date_posted: raw
            .date_posted
            .as_deref()
            .and_then(|text| parse_relative_date(text, as_of)),
        date_scraped: ctx.scraped_at,
        job_url: raw.link,
        search_url: ctx.search_url.to_string(),
        queried_job_title: ctx.query.job_title().to_string(),
        job_description: None,
    })
}
