//! # Data Model
//!
//! Records, payload values, entity keys and the status vocabulary used in the
//! audit trail. Payloads are carried verbatim; only the configured start and
//! end fields are ever rewritten.

use crate::config::{DEFAULT_END_FIELD, DEFAULT_START_FIELD};
use crate::error::{ResolveError, Result};
use crate::temporal::{Instant, Interval, TimeAxis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// A single payload value.
///
/// JSON strings always deserialize as [`FieldValue::Text`] so payloads
/// round-trip verbatim. Boundary fields holding `"YYYY-MM-DD"` dates or
/// RFC 3339 timestamps are parsed when read through [`FieldValue::instant`];
/// derived boundaries are written back as `Date` or `Timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    #[serde(skip_deserializing)]
    Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime),
    #[serde(skip_deserializing)]
    Date(#[serde(with = "iso_date")] Date),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Date(_) => "date",
            FieldValue::Text(_) => "text",
        }
    }

    /// Map a temporal value onto its axis.
    ///
    /// Text is read as a date or an RFC 3339 timestamp. Timestamps outside
    /// the nanosecond range of an [`Instant`] have no position.
    pub fn instant(&self) -> Option<(TimeAxis, Instant)> {
        match self {
            FieldValue::Date(date) => Some((TimeAxis::Date, Instant::from(date.to_julian_day()))),
            FieldValue::Timestamp(ts) => Instant::try_from(ts.unix_timestamp_nanos())
                .ok()
                .map(|nanos| (TimeAxis::Timestamp, nanos)),
            FieldValue::Int(value) => Some((TimeAxis::Integer, *value)),
            FieldValue::Text(text) => parse_temporal(text)?.instant(),
            _ => None,
        }
    }
}

fn parse_temporal(text: &str) -> Option<FieldValue> {
    if let Ok(date) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Some(FieldValue::Date(date));
    }
    OffsetDateTime::parse(text, &Rfc3339)
        .ok()
        .map(FieldValue::Timestamp)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(value) => write!(f, "{value}"),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float(value) => write!(f, "{value}"),
            FieldValue::Timestamp(value) => write!(f, "{value}"),
            FieldValue::Date(value) => write!(f, "{value}"),
            FieldValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Date> for FieldValue {
    fn from(value: Date) -> Self {
        FieldValue::Date(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl TimeAxis {
    /// Render an instant back into a payload value of this axis.
    ///
    /// Timestamps take the offset of `template` when it is a timestamp, UTC
    /// otherwise. Returns `None` when the instant is out of the axis range.
    pub fn value_like(self, instant: Instant, template: Option<&FieldValue>) -> Option<FieldValue> {
        match self {
            TimeAxis::Date => {
                let day = i32::try_from(instant).ok()?;
                Date::from_julian_day(day).ok().map(FieldValue::Date)
            }
            TimeAxis::Timestamp => {
                let offset = match template {
                    Some(FieldValue::Timestamp(ts)) => ts.offset(),
                    Some(FieldValue::Text(text)) => match parse_temporal(text) {
                        Some(FieldValue::Timestamp(ts)) => ts.offset(),
                        _ => UtcOffset::UTC,
                    },
                    _ => UtcOffset::UTC,
                };
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(instant))
                    .ok()
                    .map(|ts| FieldValue::Timestamp(ts.to_offset(offset)))
            }
            TimeAxis::Integer => Some(FieldValue::Int(instant)),
        }
    }
}

/// An ordered map of field name to value; one row of the input collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let fields = iter
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect();
        Self { fields }
    }
}

/// The grouping key under which intervals must not overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum EntityKey {
    /// Every record belongs to one partition (no entity field configured).
    All,
    Bool(bool),
    Int(i64),
    Date(#[serde(with = "iso_date")] Date),
    Text(String),
}

impl EntityKey {
    /// Project a payload value onto a grouping key.
    pub fn from_value(value: &FieldValue) -> std::result::Result<Self, &'static str> {
        match value {
            FieldValue::Bool(value) => Ok(EntityKey::Bool(*value)),
            FieldValue::Int(value) => Ok(EntityKey::Int(*value)),
            FieldValue::Date(value) => Ok(EntityKey::Date(*value)),
            FieldValue::Text(value) => Ok(EntityKey::Text(value.clone())),
            FieldValue::Null => Err("null cannot identify an entity"),
            FieldValue::Float(_) => Err("floating point values cannot identify an entity"),
            FieldValue::Timestamp(_) => Err("timestamps cannot identify an entity"),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::All => f.write_str("*"),
            EntityKey::Bool(value) => write!(f, "{value}"),
            EntityKey::Int(value) => write!(f, "{value}"),
            EntityKey::Date(value) => write!(f, "{value}"),
            EntityKey::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        EntityKey::Text(value.to_string())
    }
}

impl From<i64> for EntityKey {
    fn from(value: i64) -> Self {
        EntityKey::Int(value)
    }
}

/// Names of the fields that carry the interval and the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub start: String,
    pub end: String,
    /// `None` treats the whole input as a single partition.
    pub entity: Option<String>,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            start: DEFAULT_START_FIELD.to_string(),
            end: DEFAULT_END_FIELD.to_string(),
            entity: None,
        }
    }
}

impl FieldMapping {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            entity: None,
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    /// Partition key of the record at input position `index`.
    pub fn entity_of(&self, index: usize, record: &Record) -> Result<EntityKey> {
        let Some(field) = self.entity.as_deref() else {
            return Ok(EntityKey::All);
        };
        let value = record
            .get(field)
            .ok_or_else(|| ResolveError::missing_field(index, field))?;
        EntityKey::from_value(value).map_err(|reason| ResolveError::InvalidEntity {
            record: index,
            field: field.to_string(),
            reason: reason.to_string(),
        })
    }

    /// Read a boundary field as an instant.
    pub fn boundary(
        &self,
        index: usize,
        record: &Record,
        field: &str,
    ) -> Result<(TimeAxis, Instant)> {
        let value = record
            .get(field)
            .ok_or_else(|| ResolveError::missing_field(index, field))?;
        value.instant().ok_or_else(|| {
            let reason = match value {
                FieldValue::Timestamp(_) => {
                    format!("`{field}` holds a timestamp outside the nanosecond range")
                }
                FieldValue::Text(text) => format!(
                    "`{field}` holds `{text}`; expected a date, timestamp or integer"
                ),
                other => format!(
                    "`{field}` holds a {} value; expected a date, timestamp or integer",
                    other.kind()
                ),
            };
            ResolveError::invalid_interval(index, reason)
        })
    }
}

/// One interval claim of an entity, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalRecord {
    /// Position of the originating record in the input sequence.
    pub source: usize,
    pub entity: EntityKey,
    pub axis: TimeAxis,
    pub interval: Interval,
    pub payload: Record,
}

impl IntervalRecord {
    /// Build an interval record from a raw row.
    pub fn from_record(
        source: usize,
        entity: EntityKey,
        payload: Record,
        fields: &FieldMapping,
    ) -> Result<Self> {
        let (axis, start) = fields.boundary(source, &payload, &fields.start)?;
        let (end_axis, end) = fields.boundary(source, &payload, &fields.end)?;
        if axis != end_axis {
            return Err(ResolveError::invalid_interval(
                source,
                format!("start is a {axis} but end is a {end_axis}"),
            ));
        }
        let interval = Interval::new(start, end).ok_or_else(|| {
            ResolveError::invalid_interval(
                source,
                format!(
                    "start ({}) must be before end ({})",
                    payload.get(&fields.start).map(ToString::to_string).unwrap_or_default(),
                    payload.get(&fields.end).map(ToString::to_string).unwrap_or_default(),
                ),
            )
        })?;
        Ok(Self {
            source,
            entity,
            axis,
            interval,
            payload,
        })
    }

    /// A new record over `interval` carrying its own copy of this payload.
    pub fn with_interval(&self, interval: Interval) -> Self {
        Self {
            source: self.source,
            entity: self.entity.clone(),
            axis: self.axis,
            interval,
            payload: self.payload.clone(),
        }
    }

    /// Write `[start, end)` back into the payload's boundary fields.
    ///
    /// Fields whose value already maps to the requested instant are left
    /// untouched so their source text survives.
    pub fn to_record(&self, fields: &FieldMapping, start: Instant, end: Instant) -> Result<Record> {
        let mut payload = self.payload.clone();
        for (field, instant) in [(&fields.start, start), (&fields.end, end)] {
            let current = payload.get(field);
            if current.and_then(FieldValue::instant).map(|(_, at)| at) == Some(instant) {
                continue;
            }
            let value = self.axis.value_like(instant, current).ok_or_else(|| {
                ResolveError::invalid_interval(
                    self.source,
                    format!("boundary {instant} is outside the {} range", self.axis),
                )
            })?;
            payload.insert(field.as_str(), value);
        }
        Ok(payload)
    }
}

/// Final disposition of an interval instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusLabel {
    #[serde(rename = "Added/Retained")]
    AddedRetained,
    #[serde(rename = "Trimmed Start")]
    TrimmedStart,
    #[serde(rename = "Trimmed End")]
    TrimmedEnd,
    #[serde(rename = "Removed (Fully Subsumed)")]
    RemovedFullySubsumed,
    #[serde(rename = "Removed (Overlapped Start)")]
    RemovedOverlappedStart,
}

impl StatusLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::AddedRetained => "Added/Retained",
            StatusLabel::TrimmedStart => "Trimmed Start",
            StatusLabel::TrimmedEnd => "Trimmed End",
            StatusLabel::RemovedFullySubsumed => "Removed (Fully Subsumed)",
            StatusLabel::RemovedOverlappedStart => "Removed (Overlapped Start)",
        }
    }

    pub fn is_removed(self) -> bool {
        matches!(
            self,
            StatusLabel::RemovedFullySubsumed | StatusLabel::RemovedOverlappedStart
        )
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one physical interval instance at specific bounds.
///
/// `instance` is the fold-sequence number of the instance inside its entity:
/// input records are numbered in fold order and every derived right
/// remainder takes the next free number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StatusKey {
    pub entity: EntityKey,
    pub start: Instant,
    pub end: Instant,
    pub instance: u32,
}

impl StatusKey {
    pub fn new(entity: EntityKey, interval: Interval, instance: u32) -> Self {
        Self {
            entity,
            start: interval.start,
            end: interval.end,
            instance,
        }
    }

    pub fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            end: self.end,
        }
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})#{}",
            self.entity, self.start, self.end, self.instance
        )
    }
}
