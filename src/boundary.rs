//! # Boundary Module
//!
//! Conversion between the resolver's half-open `[start, end)` convention and
//! whatever the surrounding storage expects. Nothing here performs I/O; the
//! codec only reshapes in-memory records on their way in and out.

use crate::error::Result;
use crate::model::{EntityKey, FieldMapping, FieldValue, Record, StatusKey, StatusLabel};
use crate::resolver::ResolvedRecord;
use crate::status::StatusMap;
use crate::temporal::{Instant, TimeAxis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a stored `end` value relates to the interval it bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndConvention {
    /// `end` is the first instant not covered.
    #[default]
    Exclusive,
    /// `end` is the last instant covered.
    Inclusive,
}

impl EndConvention {
    /// Exclusive end for a stored end value.
    pub fn ingest(self, end: Instant) -> Instant {
        match self {
            EndConvention::Exclusive => end,
            EndConvention::Inclusive => end.saturating_add(1),
        }
    }

    /// Stored end value for an exclusive end.
    pub fn export(self, end: Instant) -> Instant {
        match self {
            EndConvention::Exclusive => end,
            EndConvention::Inclusive => end.saturating_sub(1),
        }
    }
}

/// One status entry rendered in the units of its entity's time axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEntry {
    pub entity: EntityKey,
    pub start: FieldValue,
    pub end: FieldValue,
    pub instance: u32,
    pub status: StatusLabel,
}

/// Reshapes records between the storage convention and the resolver.
#[derive(Debug, Clone, Default)]
pub struct BoundaryCodec {
    fields: FieldMapping,
    input_end: EndConvention,
    output_end: EndConvention,
    status_field: Option<String>,
}

impl BoundaryCodec {
    pub fn new(fields: FieldMapping) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_conventions(mut self, input_end: EndConvention, output_end: EndConvention) -> Self {
        self.input_end = input_end;
        self.output_end = output_end;
        self
    }

    /// Emit the final status label under `field` on every exported record.
    pub fn with_status_field(mut self, field: Option<String>) -> Self {
        self.status_field = field;
        self
    }

    pub fn fields(&self) -> &FieldMapping {
        &self.fields
    }

    pub fn input_end(&self) -> EndConvention {
        self.input_end
    }

    pub fn output_end(&self) -> EndConvention {
        self.output_end
    }

    /// Convert stored end values to exclusive ends.
    ///
    /// Records whose end cannot be read are passed through unchanged so the
    /// resolver reports them against their own partition.
    pub fn ingest(&self, records: Vec<Record>) -> Vec<Record> {
        if self.input_end == EndConvention::Exclusive {
            return records;
        }
        records
            .into_iter()
            .map(|mut record| {
                let shifted = record
                    .get(&self.fields.end)
                    .and_then(|value| {
                        let (axis, end) = value.instant()?;
                        axis.value_like(self.input_end.ingest(end), Some(value))
                    });
                if let Some(value) = shifted {
                    record.insert(self.fields.end.as_str(), value);
                }
                record
            })
            .collect()
    }

    /// Materialize surviving intervals as storage records.
    pub fn export(&self, resolved: &[ResolvedRecord]) -> Result<Vec<Record>> {
        resolved
            .iter()
            .map(|item| {
                let interval = item.record.interval;
                let mut record = item.record.to_record(
                    &self.fields,
                    interval.start,
                    self.output_end.export(interval.end),
                )?;
                if let Some(field) = &self.status_field {
                    record.insert(field.as_str(), item.status.as_str());
                }
                Ok(record)
            })
            .collect()
    }

    /// Render a status map for reporting. Bounds stay half-open; entities
    /// without a known axis are rendered as raw instants.
    pub fn status_entries(
        &self,
        statuses: &StatusMap,
        axes: &BTreeMap<EntityKey, TimeAxis>,
    ) -> Vec<StatusEntry> {
        statuses
            .iter()
            .map(|(key, status)| render_entry(key, *status, axes.get(&key.entity).copied()))
            .collect()
    }
}

fn render_entry(key: &StatusKey, status: StatusLabel, axis: Option<TimeAxis>) -> StatusEntry {
    let render = |instant: Instant| {
        axis.and_then(|axis| axis.value_like(instant, None))
            .unwrap_or(FieldValue::Int(instant))
    };
    StatusEntry {
        entity: key.entity.clone(),
        start: render(key.start),
        end: render(key.end),
        instance: key.instance,
        status,
    }
}
