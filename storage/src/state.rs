use moltscrape_core::{AuthorEntry, PostRecord, UNKNOWN_AUTHOR};
use std::collections::{BTreeMap, HashSet};

/// In-memory working copy of the durable scrape state: the set of every post
/// id ever ingested plus the author registry. Owned by the caller and passed
/// by reference into the harvest loop; only grows, never shrinks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestState {
    seen: HashSet<String>,
    authors: BTreeMap<String, AuthorEntry>,
}

impl HarvestState {
    pub fn new(seen: HashSet<String>, authors: BTreeMap<String, AuthorEntry>) -> Self {
        Self { seen, authors }
    }

    pub fn is_new(&self, post_id: &str) -> bool {
        !self.seen.contains(post_id)
    }

    pub fn mark_seen(&mut self, post_id: &str) {
        self.seen.insert(post_id.to_string());
    }

    /// Upsert the registry entry for the record's author. The `"unknown"`
    /// sentinel is never tracked.
    pub fn record_author(&mut self, record: &PostRecord) {
        if record.author_name.is_empty() || record.author_name == UNKNOWN_AUTHOR {
            return;
        }

        let entry = self
            .authors
            .entry(record.author_name.clone())
            .or_insert_with(|| AuthorEntry {
                first_seen: record.scraped_at.clone(),
                last_seen: record.scraped_at.clone(),
                post_count: 0,
                submolts: Vec::new(),
            });

        entry.post_count += 1;
        entry.last_seen = record.scraped_at.clone();
        if !entry.submolts.contains(&record.submolt) {
            entry.submolts.push(record.submolt.clone());
        }
    }

    pub fn author(&self, name: &str) -> Option<&AuthorEntry> {
        self.authors.get(name)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }

    pub fn seen_ids(&self) -> &HashSet<String> {
        &self.seen
    }

    pub fn authors(&self) -> &BTreeMap<String, AuthorEntry> {
        &self.authors
    }
}
