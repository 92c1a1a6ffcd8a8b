//! Bookmark totals, per-day counts and the most saved domain.

use crate::model::bookmark::BookmarkRecord;
use chrono::{DateTime, NaiveDate};
use std::collections::BTreeMap;
use url::Url;

const UNPARSABLE_DOMAIN: &str = "link";

/// Bookmarks saved on one UTC calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCount {
    pub day: NaiveDate,
    pub count: usize,
}

/// Most frequent host among saved bookmarks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

/// Aggregate view computed from a list snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BookmarkStats {
    pub total: usize,
    /// Ascending by day.
    pub daily_counts: Vec<DailyCount>,
    /// Ties resolve to the lexicographically smallest domain.
    pub top_domain: Option<DomainCount>,
}

impl BookmarkStats {
    pub fn from_records(records: &[BookmarkRecord]) -> Self {
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        let mut per_domain: BTreeMap<String, usize> = BTreeMap::new();

        for record in records {
            if let Some(day) = utc_day(record.created_at) {
                *per_day.entry(day).or_default() += 1;
            }
            *per_domain.entry(extract_domain(&record.url)).or_default() += 1;
        }

        // BTreeMap iterates domains in order, so `>` keeps the first on ties.
        let mut top_domain: Option<DomainCount> = None;
        for (domain, count) in per_domain {
            if top_domain.as_ref().map_or(true, |top| count > top.count) {
                top_domain = Some(DomainCount { domain, count });
            }
        }

        Self {
            total: records.len(),
            daily_counts: per_day
                .into_iter()
                .map(|(day, count)| DailyCount { day, count })
                .collect(),
            top_domain,
        }
    }
}

/// WHATWG host of an absolute URL, or `"link"` when it has none.
///
/// International hosts come back in their punycode form.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| UNPARSABLE_DOMAIN.to_string())
}

fn utc_day(epoch_ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(epoch_ms).map(|at| at.date_naive())
}
