//! Ordered, id-unique bookmark sequence.

use crate::model::bookmark::{BookmarkId, BookmarkRecord};
use std::collections::HashSet;

/// Bookmarks sorted by `created_at` descending with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciledList {
    records: Vec<BookmarkRecord>,
}

impl ReconciledList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from a bulk fetch.
    ///
    /// Later duplicates of an id are dropped; ties on `created_at` keep the
    /// fetch order.
    pub fn from_fetch(records: Vec<BookmarkRecord>) -> Self {
        let mut list = Self::new();
        list.replace_all(records);
        list
    }

    /// Replaces the contents wholesale with a bulk fetch result.
    pub fn replace_all(&mut self, records: Vec<BookmarkRecord>) {
        let mut seen = HashSet::with_capacity(records.len());
        let mut unique: Vec<BookmarkRecord> = records
            .into_iter()
            .filter(|record| seen.insert(record.id.clone()))
            .collect();
        // Stable sort keeps arrival order for equal timestamps.
        unique.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        self.records = unique;
    }

    /// Inserts `record` at its ordered position unless its id is present.
    ///
    /// Returns `false` without touching the existing entry on duplicates.
    pub fn insert_if_absent(&mut self, record: BookmarkRecord) -> bool {
        if self.contains(&record.id) {
            return false;
        }
        let index = self
            .records
            .iter()
            .position(|existing| existing.created_at <= record.created_at)
            .unwrap_or(self.records.len());
        self.records.insert(index, record);
        true
    }

    /// Removes and returns the record with `id`, if present.
    pub fn remove(&mut self, id: &BookmarkId) -> Option<BookmarkRecord> {
        let index = self.position(id)?;
        Some(self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &BookmarkId) -> Option<&BookmarkRecord> {
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn position(&self, id: &BookmarkId) -> Option<usize> {
        self.records.iter().position(|record| &record.id == id)
    }

    pub fn as_slice(&self) -> &[BookmarkRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &BookmarkRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
