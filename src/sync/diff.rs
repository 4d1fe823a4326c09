//! URL-keyed partition of a fetched snapshot against the stored one.

use std::collections::{HashMap, HashSet};

use chrono::Utc;

use crate::models::{ListingRecord, generate_id};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingDiff {
    /// Fetched but not stored
    pub added: Vec<ListingRecord>,
    /// Stored but no longer fetched
    pub removed: Vec<ListingRecord>,
    /// Present on both sides, carrying the fetched field values
    pub leftover: Vec<ListingRecord>,
}

impl ListingDiff {
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Give every added record an owner, a fresh id and the `is_new` flag.
    pub fn stamp_added(&mut self, user_id: i64) {
        let now = Utc::now();
        for record in &mut self.added {
            record.id = generate_id();
            record.user_id = user_id;
            record.created_at = now;
            record.is_new = true;
        }
    }
}

/// Partition `stored ∪ fetched` by URL.
///
/// Duplicate URLs within one side collapse to their first occurrence. Leftover
/// records keep the stored identity (id, owner, creation time) and take every
/// other field from the fetched side.
pub fn diff(stored: &[ListingRecord], fetched: &[ListingRecord]) -> ListingDiff {
    let stored_by_url: HashMap<&str, &ListingRecord> = stored
        .iter()
        .rev()
        .map(|r| (r.url.as_str(), r))
        .collect();

    let mut result = ListingDiff::default();
    let mut seen_fetched: HashSet<&str> = HashSet::with_capacity(fetched.len());

    for record in fetched {
        if !seen_fetched.insert(record.url.as_str()) {
            continue;
        }

        match stored_by_url.get(record.url.as_str()) {
            Some(existing) => result.leftover.push(ListingRecord {
                id: existing.id.clone(),
                user_id: existing.user_id,
                created_at: existing.created_at,
                is_new: false,
                ..record.clone()
            }),
            None => result.added.push(record.clone()),
        }
    }

    let mut seen_stored: HashSet<&str> = HashSet::with_capacity(stored.len());
    for record in stored {
        if !seen_stored.insert(record.url.as_str()) {
            continue;
        }
        if !seen_fetched.contains(record.url.as_str()) {
            result.removed.push(record.clone());
        }
    }

    result
}
