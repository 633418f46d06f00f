//! Queue input. Two surface forms map onto the same `QuerySpec` values:
//!
//! ```text
//! # one query per line, `key=value` pairs separated by `;`
//! title=Data Analyst; location=New York, NY; radius=25; pages=1; days=7
//! title=Nurse; setting=remote; type=full-time; descriptions=true
//! ```
//!
//! or a JSON array of `QuerySpec` objects.

use std::path::Path;

use crate::query::QuerySpec;
use crate::{info_time, Error, Result};

/// Loads a queue file. `.json` files are read as a structured list, anything else as directives.
pub async fn load_queue(path: impl AsRef<Path>) -> Result<Vec<QuerySpec>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await?;
    let specs = if path.extension().is_some_and(|ext| ext == "json") {
        parse_json(&raw)?
    } else {
        parse_directives(&raw)?
    };
    info_time!("Loaded {} queued queries from {}", specs.len(), path.display());
    Ok(specs)
}

pub fn parse_json(raw: &str) -> Result<Vec<QuerySpec>> {
    Ok(serde_json::from_str(raw)?)
}

/// Parses line directives. Syntax errors are reported with their 1-based line number;
/// semantic checks (empty title, bad filter values) are left to `SearchQuery::try_from`
/// so one bad entry does not sink the rest of the queue.
pub fn parse_directives(raw: &str) -> Result<Vec<QuerySpec>> {
    let mut specs = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        specs.push(parse_line(line).map_err(|reason| Error::Queue {
            line: idx + 1,
            reason,
        })?);
    }
    Ok(specs)
}

fn parse_line(line: &str) -> core::result::Result<QuerySpec, String> {
    let mut spec = QuerySpec::default();
    for part in line.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got `{part}`"))?;
        let (key, value) = (key.trim().to_lowercase(), value.trim());
        match key.as_str() {
            "title" => spec.job_title = value.to_string(),
            "location" => spec.location = Some(value.to_string()),
            "radius" => spec.search_radius = Some(number(&key, value)?),
            "pages" => spec.max_pages = Some(number(&key, value)?),
            "days" => spec.days_ago = Some(number(&key, value)?),
            "setting" => spec.work_setting = Some(value.to_string()),
            "type" => spec.job_type = Some(value.to_string()),
            "descriptions" => {
                spec.fetch_descriptions = value
                    .parse()
                    .map_err(|_| format!("descriptions must be true or false, got `{value}`"))?
            }
            _ => return Err(format!("unknown key `{key}`")),
        }
    }
    Ok(spec)
}

#[inline]
fn number(key: &str, value: &str) -> core::result::Result<u32, String> {
    value
        .parse()
        .map_err(|_| format!("{key} must be a non-negative number, got `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_and_json_agree() {
        let directives = "\
# morning batch
title=Data Analyst; location=New York, NY; radius=25; pages=1; days=7

title=Nurse; setting=remote; type=full-time; descriptions=true
";
        let json = r#"[
            {"job_title": "Data Analyst", "location": "New York, NY", "search_radius": 25,
             "max_pages": 1, "days_ago": 7},
            {"job_title": "Nurse", "work_setting": "remote", "job_type": "full-time",
             "fetch_descriptions": true}
        ]"#;
        let from_lines = parse_directives(directives).unwrap();
        assert_eq!(from_lines.len(), 2);
        assert_eq!(from_lines, parse_json(json).unwrap());
    }

    #[test]
    fn syntax_errors_name_the_line() {
        let err = parse_directives("title=A\n\ntitle=B; pages=lots\n").unwrap_err();
        assert!(matches!(err, Error::Queue { line: 3, .. }));

        let err = parse_directives("title=A; colour=blue").unwrap_err();
        assert!(matches!(err, Error::Queue { line: 1, .. }));
    }

    #[tokio::test]
    async fn load_picks_format_by_extension() {
        let dir = std::env::temp_dir().join(format!("jobscrap-queue-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let json_path = dir.join("queue.json");
        tokio::fs::write(&json_path, r#"[{"job_title": "Welder"}]"#).await.unwrap();
        let txt_path = dir.join("queue.txt");
        tokio::fs::write(&txt_path, "title=Welder\n").await.unwrap();

        assert_eq!(load_queue(&json_path).await.unwrap(), load_queue(&txt_path).await.unwrap());
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
