//! # Temporal Module
//!
//! Half-open intervals and the pure comparator predicates used by the resolver.
//! Every boundary is an [`Instant`] on a single [`TimeAxis`]; calendar values are
//! mapped onto the axis before any comparison happens.

use serde::{Deserialize, Serialize};
use std::cmp::{max, min, Ordering};
use std::fmt;

/// A point on a time axis.
///
/// Dates are stored as Julian day numbers, timestamps as Unix nanoseconds and
/// plain integers as themselves, so one tick is always the axis resolution.
pub type Instant = i64;

/// The kind of value a boundary was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeAxis {
    /// Calendar dates, one tick per day.
    Date,
    /// Offset date-times, one tick per nanosecond (1677 to 2262).
    Timestamp,
    /// Plain integers, one tick per unit.
    Integer,
}

impl TimeAxis {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeAxis::Date => "date",
            TimeAxis::Timestamp => "timestamp",
            TimeAxis::Integer => "integer",
        }
    }
}

impl fmt::Display for TimeAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A temporal interval [start, end) where start < end
///
/// Intervals are half-open: the start time is inclusive, the end time is exclusive.
/// Adjacent intervals [t0, t1) and [t1, t2) therefore never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// Start time (inclusive)
    pub start: Instant,
    /// End time (exclusive)
    pub end: Instant,
}

impl Interval {
    /// Create a new interval, or `None` when `start >= end`.
    pub fn new(start: Instant, end: Instant) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Check if this interval contains a specific instant
    pub fn contains(&self, instant: Instant) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Number of ticks covered by the interval.
    pub fn len(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    /// Always false for intervals built through [`Interval::new`].
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check whether the two intervals share at least one instant.
    #[inline]
    pub fn overlaps(&self, other: &Interval) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// The shared part of two intervals, if any.
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        if self.overlaps(other) {
            let (start, end) = overlap_range(self.start, self.end, other.start, other.end);
            Some(Interval { start, end })
        } else {
            None
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.start.cmp(&other.start) {
            Ordering::Equal => self.end.cmp(&other.end),
            ordering => ordering,
        }
    }
}

/// Check if [s1, e1) and [s2, e2) overlap.
#[inline]
pub fn overlaps<T: Ord>(s1: T, e1: T, s2: T, e2: T) -> bool {
    !(e1 <= s2 || s1 >= e2)
}

/// Shared range of two overlapping intervals.
///
/// The caller must have checked [`overlaps`] first; for disjoint inputs the
/// returned pair is not a valid interval.
#[inline]
pub fn overlap_range<T: Ord>(s1: T, e1: T, s2: T, e2: T) -> (T, T) {
    (max(s1, s2), min(e1, e2))
}

/// Check whether an overlap [overlap_start, overlap_end) fully covers the
/// target interval.
#[inline]
pub fn subsumes<T: Ord>(overlap_start: T, overlap_end: T, target_start: T, target_end: T) -> bool {
    overlap_start <= target_start && overlap_end >= target_end
}
