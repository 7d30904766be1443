//! # Resolver Module
//!
//! Folds one entity's records, in priority order, into a set of pairwise
//! non-overlapping intervals. The incoming record always wins: every
//! accepted interval it touches is removed, trimmed at its end, or split
//! around it, and each change is written to the [`StatusTracker`].
//!
//! ```text
//! accepted:  [-------- A --------)
//! incoming:        [--- B ---)
//! result:    [-A-) [--- B ---) [-A'-)
//!            Trimmed End        Trimmed Start
//! ```

use crate::error::Result;
use crate::model::{EntityKey, IntervalRecord, StatusKey, StatusLabel};
use crate::status::StatusTracker;
use crate::temporal::{overlap_range, overlaps, subsumes, Interval};
use tracing::trace;

/// A surviving interval and the status entry that describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRecord {
    pub record: IntervalRecord,
    pub status: StatusLabel,
    pub status_key: StatusKey,
}

/// Outcome of resolving one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entity: EntityKey,
    pub records: Vec<ResolvedRecord>,
    pub statuses: StatusTracker,
}

/// What a single fold step did to the accepted set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FoldEffect {
    pub removed: usize,
    pub trimmed: usize,
    pub remainders: usize,
}

#[derive(Debug)]
struct Accepted {
    record: IntervalRecord,
    instance: u32,
    label: StatusLabel,
    /// Entry already written for this instance, if any.
    written: Option<StatusKey>,
    removed: bool,
}

impl Accepted {
    fn new(record: IntervalRecord, instance: u32, label: StatusLabel) -> Self {
        Self {
            record,
            instance,
            label,
            written: None,
            removed: false,
        }
    }
}

/// Incremental state machine for one entity.
#[derive(Debug)]
pub struct IntervalResolver {
    entity: EntityKey,
    accepted: Vec<Accepted>,
    tracker: StatusTracker,
    next_instance: u32,
}

impl IntervalResolver {
    pub fn new(entity: EntityKey) -> Self {
        Self {
            entity,
            accepted: Vec::new(),
            tracker: StatusTracker::new(),
            next_instance: 0,
        }
    }

    /// Resolve records that are already in fold order.
    pub fn resolve<I>(entity: EntityKey, ordered: I) -> Result<Resolution>
    where
        I: IntoIterator<Item = IntervalRecord>,
    {
        let mut resolver = Self::new(entity);
        for record in ordered {
            resolver.fold(record)?;
        }
        resolver.finish()
    }

    /// Number of intervals currently accepted.
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// Current accepted intervals, in insertion order.
    pub fn intervals(&self) -> impl Iterator<Item = Interval> + '_ {
        self.accepted.iter().map(|slot| slot.record.interval)
    }

    fn allocate_instance(&mut self) -> u32 {
        let instance = self.next_instance;
        self.next_instance += 1;
        instance
    }

    /// Fold one record in. Every accepted interval is compared against the
    /// incoming bounds; the incoming record itself is never trimmed.
    pub fn fold(&mut self, incoming: IntervalRecord) -> Result<FoldEffect> {
        let instance = self.allocate_instance();
        let new = incoming.interval;
        let mut effect = FoldEffect::default();
        let mut remainders = Vec::new();

        for existing in self.accepted.iter_mut() {
            let current = existing.record.interval;
            if !overlaps(new.start, new.end, current.start, current.end) {
                continue;
            }
            let (ov_start, ov_end) = overlap_range(new.start, new.end, current.start, current.end);
            let current_key = StatusKey::new(self.entity.clone(), current, existing.instance);

            if subsumes(ov_start, ov_end, current.start, current.end) {
                self.tracker
                    .record(current_key, StatusLabel::RemovedFullySubsumed)?;
                existing.label = StatusLabel::RemovedFullySubsumed;
                existing.removed = true;
                effect.removed += 1;
                continue;
            }

            if ov_start > current.start {
                existing.record.interval.end = ov_start;
                self.tracker
                    .record(current_key.clone(), StatusLabel::TrimmedEnd)?;
                existing.label = StatusLabel::TrimmedEnd;
                existing.written = Some(current_key);
                effect.trimmed += 1;
            } else {
                self.tracker
                    .record(current_key, StatusLabel::RemovedOverlappedStart)?;
                existing.label = StatusLabel::RemovedOverlappedStart;
                existing.removed = true;
                effect.removed += 1;
            }

            if ov_end < current.end {
                let right = Interval {
                    start: ov_end,
                    end: current.end,
                };
                remainders.push(existing.record.with_interval(right));
            }
        }

        self.accepted.retain(|slot| !slot.removed);

        effect.remainders = remainders.len();
        for remainder in remainders {
            let instance = self.allocate_instance();
            self.accepted
                .push(Accepted::new(remainder, instance, StatusLabel::TrimmedStart));
        }

        trace!(
            entity = %self.entity,
            interval = %new,
            removed = effect.removed,
            trimmed = effect.trimmed,
            remainders = effect.remainders,
            "folded interval"
        );
        self.accepted
            .push(Accepted::new(incoming, instance, StatusLabel::AddedRetained));
        Ok(effect)
    }

    /// Settle pending statuses and hand back the surviving intervals.
    pub fn finish(self) -> Result<Resolution> {
        let Self {
            entity,
            accepted,
            mut tracker,
            ..
        } = self;

        let mut records = Vec::with_capacity(accepted.len());
        for slot in accepted {
            let status_key = match slot.written {
                Some(key) => key,
                None => {
                    let key = StatusKey::new(entity.clone(), slot.record.interval, slot.instance);
                    tracker.record(key.clone(), slot.label)?;
                    key
                }
            };
            records.push(ResolvedRecord {
                record: slot.record,
                status: slot.label,
                status_key,
            });
        }

        Ok(Resolution {
            entity,
            records,
            statuses: tracker,
        })
    }
}

/// First pair of overlapping intervals within the same entity, if any.
pub fn first_overlap<'a, I>(intervals: I) -> Option<(EntityKey, Interval, Interval)>
where
    I: IntoIterator<Item = (&'a EntityKey, Interval)>,
{
    let mut sorted: Vec<(&EntityKey, Interval)> = intervals.into_iter().collect();
    sorted.sort();
    sorted.windows(2).find_map(|pair| {
        let ((left_entity, left), (right_entity, right)) = (pair[0], pair[1]);
        (left_entity == right_entity && left.overlaps(&right))
            .then(|| (left_entity.clone(), left, right))
    })
}
