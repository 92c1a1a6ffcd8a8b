//! Case-insensitive substring filter.

use crate::model::bookmark::BookmarkRecord;

/// Returns records whose title or url contains `term`, ignoring case.
///
/// An empty term matches everything. The term is not trimmed, so a
/// whitespace-only term matches only records containing that whitespace.
pub fn filter_bookmarks<'a>(records: &'a [BookmarkRecord], term: &str) -> Vec<&'a BookmarkRecord> {
    if term.is_empty() {
        return records.iter().collect();
    }

    let needle = term.to_lowercase();
    records
        .iter()
        .filter(|record| {
            record.title.to_lowercase().contains(&needle)
                || record.url.to_lowercase().contains(&needle)
        })
        .collect()
}
