//! # Chronofold
//!
//! Temporal interval consolidation: records that belong to the same entity
//! are folded, in priority order, into a set of pairwise non-overlapping
//! half-open intervals, with an audit label for every interval instance
//! that was retained, trimmed, split or removed along the way.
//!
//! ```text
//! records ─▶ group by entity ─▶ rank ─▶ fold ─▶ merge ─▶ records + statuses
//! ```
//!
//! The core never performs storage I/O. [`boundary`] converts end-value
//! conventions at the edges, and [`pipeline`] runs consolidation as one
//! step of a table-level run.

pub mod boundary;
pub mod config;
pub mod error;
pub mod model;
pub mod partition;
pub mod pipeline;
pub mod priority;
pub mod resolver;
pub mod status;
pub mod temporal;

// Re-export main types for convenience
pub use boundary::{BoundaryCodec, EndConvention, StatusEntry};
pub use config::{ConfigError, ConfigOverrides, ConsolidationConfig};
pub use error::{ResolveError, Result};
pub use model::{EntityKey, FieldMapping, FieldValue, IntervalRecord, Record, StatusKey, StatusLabel};
pub use partition::{CancellationToken, PartitionDriver, PartitionOutcome, ResolutionReport};
pub use priority::{Direction, PolicyRegistry, PriorityPolicy, Ranker};
pub use resolver::{IntervalResolver, ResolvedRecord};
pub use status::{StatusMap, StatusTracker};
pub use temporal::{Instant, Interval, TimeAxis};

/// Resolve `records` with half-open `[start, end)` boundaries.
///
/// Without `entity_field` the whole input is one partition. Failures are
/// reported per partition in the returned report; partitions that resolved
/// still contribute their records and statuses.
pub fn resolve(
    records: Vec<Record>,
    start_field: &str,
    end_field: &str,
    entity_field: Option<&str>,
    ranker: &Ranker,
) -> ResolutionReport {
    let mut fields = FieldMapping::new(start_field, end_field);
    fields.entity = entity_field.map(str::to_string);
    PartitionDriver::new(fields, ranker.clone()).run(records)
}

/// Storage-facing entry point: converts end conventions around a
/// partitioned resolution run.
#[derive(Debug, Clone)]
pub struct Consolidator {
    codec: BoundaryCodec,
    driver: PartitionDriver,
}

impl Consolidator {
    pub fn new(codec: BoundaryCodec, driver: PartitionDriver) -> Self {
        Self { codec, driver }
    }

    /// Build from configuration; fails when the configured policy is unknown.
    pub fn from_config(config: &ConsolidationConfig) -> Result<Self> {
        let driver = PartitionDriver::new(config.fields.clone(), config.ranker()?)
            .with_workers(config.partitioning.workers)
            .with_parallel_threshold(config.partitioning.parallel_threshold);
        Ok(Self::new(config.codec(), driver))
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.driver = self.driver.with_cancellation(cancel);
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        self.driver.cancellation()
    }

    pub fn codec(&self) -> &BoundaryCodec {
        &self.codec
    }

    pub fn driver(&self) -> &PartitionDriver {
        &self.driver
    }

    /// Ingest stored records and resolve them.
    pub fn run(&self, records: Vec<Record>) -> ResolutionReport {
        self.driver.run(self.codec.ingest(records))
    }

    /// Surviving intervals in the output end convention.
    pub fn export(&self, report: &ResolutionReport) -> Result<Vec<Record>> {
        self.codec.export(&report.records)
    }

    pub fn status_entries(&self, report: &ResolutionReport) -> Vec<StatusEntry> {
        self.codec.status_entries(&report.statuses, &report.axes())
    }
}
