use crate::models::MetricEntry;
use std::collections::BTreeMap;

/// Date-keyed daily log. Keys are `YYYY-MM-DD`, so the map's lexicographic
/// order is also chronological order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordStore {
    entries: BTreeMap<String, MetricEntry>,
}

impl RecordStore {
    /// Builds a store from persisted entries, dropping any empty ones.
    pub fn from_entries(entries: BTreeMap<String, MetricEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(date, entry)| (date, entry.normalized()))
            .filter(|(_, entry)| !entry.is_empty())
            .collect();
        Self { entries }
    }

    pub fn get(&self, date: &str) -> Option<&MetricEntry> {
        self.entries.get(date)
    }

    /// Replaces the whole entry for `date`. An empty entry removes the key.
    /// Returns whether the stored state changed.
    pub fn put(&mut self, date: impl Into<String>, entry: MetricEntry) -> bool {
        let date = date.into();
        let entry = entry.normalized();
        if entry.is_empty() {
            return self.entries.remove(&date).is_some();
        }
        match self.entries.get(&date) {
            Some(existing) if *existing == entry => false,
            _ => {
                self.entries.insert(date, entry);
                true
            }
        }
    }

    pub fn remove(&mut self, date: &str) -> Option<MetricEntry> {
        self.entries.remove(date)
    }

    /// Ascending date keys.
    pub fn all_dates(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&str, &MetricEntry)> {
        self.entries.iter().map(|(date, entry)| (date.as_str(), entry))
    }

    pub fn entries(&self) -> &BTreeMap<String, MetricEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
