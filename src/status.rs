//! # Status Module
//!
//! Append-only audit trail of interval dispositions. Each physical interval
//! instance is written exactly once per set of bounds; a second write for the
//! same key is a resolver defect and is reported instead of overwritten.

use crate::error::{ResolveError, Result};
use crate::model::{EntityKey, StatusKey, StatusLabel};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Final status map, ordered by entity, bounds and instance.
pub type StatusMap = BTreeMap<StatusKey, StatusLabel>;

/// Accumulates status entries for one or more entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusTracker {
    entries: StatusMap,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the disposition of an instance.
    pub fn record(&mut self, key: StatusKey, label: StatusLabel) -> Result<()> {
        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(label);
                Ok(())
            }
            Entry::Occupied(slot) => Err(ResolveError::DuplicateStatus(slot.key().clone())),
        }
    }

    pub fn get(&self, key: &StatusKey) -> Option<StatusLabel> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatusKey, StatusLabel)> {
        self.entries.iter().map(|(key, label)| (key, *label))
    }

    /// Entries belonging to a single entity.
    pub fn for_entity<'a>(
        &'a self,
        entity: &'a EntityKey,
    ) -> impl Iterator<Item = (&'a StatusKey, StatusLabel)> + 'a {
        self.iter().filter(move |(key, _)| &key.entity == entity)
    }

    /// Fold another tracker into this one; colliding keys are rejected and
    /// leave `self` untouched.
    pub fn merge(&mut self, other: StatusTracker) -> Result<()> {
        if let Some(key) = other
            .entries
            .keys()
            .find(|key| self.entries.contains_key(*key))
        {
            return Err(ResolveError::DuplicateStatus(key.clone()));
        }
        self.entries.extend(other.entries);
        Ok(())
    }

    /// Count entries per label.
    pub fn tally(&self) -> StatusTally {
        let mut tally = StatusTally::default();
        for label in self.entries.values() {
            tally.add(*label);
        }
        tally
    }

    pub fn into_map(self) -> StatusMap {
        self.entries
    }
}

/// Per-label entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub added_retained: usize,
    pub trimmed_start: usize,
    pub trimmed_end: usize,
    pub removed_fully_subsumed: usize,
    pub removed_overlapped_start: usize,
}

impl StatusTally {
    pub fn add(&mut self, label: StatusLabel) {
        match label {
            StatusLabel::AddedRetained => self.added_retained += 1,
            StatusLabel::TrimmedStart => self.trimmed_start += 1,
            StatusLabel::TrimmedEnd => self.trimmed_end += 1,
            StatusLabel::RemovedFullySubsumed => self.removed_fully_subsumed += 1,
            StatusLabel::RemovedOverlappedStart => self.removed_overlapped_start += 1,
        }
    }

    pub fn removed(&self) -> usize {
        self.removed_fully_subsumed + self.removed_overlapped_start
    }
}
