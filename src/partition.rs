//! # Partition Module
//!
//! Groups records by entity and resolves every entity independently.
//!
//! ```text
//!            records
//!               │  group by entity (BTreeMap, ordered)
//!   ┌───────────┼───────────┐
//!   ▼           ▼           ▼
//! entity A    entity B    entity C      rank → fold, one task each
//!   └───────────┼───────────┘
//!               ▼
//!        merge (entity order)
//! ```
//!
//! Partitions share no mutable state. A failing partition is reported on its
//! own and never affects the output of the others; a cancelled run still
//! returns every partition that finished.

use crate::error::{ResolveError, Result};
use crate::model::{EntityKey, FieldMapping, IntervalRecord, Record};
use crate::priority::Ranker;
use crate::resolver::{IntervalResolver, Resolution, ResolvedRecord};
use crate::status::{StatusMap, StatusTally, StatusTracker};
use crate::temporal::TimeAxis;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Cooperative cancellation flag checked before each partition starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How one partition ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionOutcome {
    Resolved {
        /// `None` only for partitions without records.
        axis: Option<TimeAxis>,
        records: usize,
        statuses: usize,
    },
    Failed(ResolveError),
    Skipped,
}

/// Per-entity line of the resolution report.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReport {
    pub entity: EntityKey,
    pub input_records: usize,
    pub outcome: PartitionOutcome,
}

/// Run-wide counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionStats {
    pub input_records: usize,
    pub output_records: usize,
    pub partitions: usize,
    pub failed_partitions: usize,
    pub skipped_partitions: usize,
    pub unassigned_records: usize,
    pub statuses: StatusTally,
}

/// Everything a resolution run produced.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// Surviving intervals of every resolved partition, in entity order.
    pub records: Vec<ResolvedRecord>,
    pub statuses: StatusMap,
    pub partitions: Vec<PartitionReport>,
    /// Records that could not be assigned to any entity.
    pub unassigned: Vec<ResolveError>,
    pub stats: ResolutionStats,
}

impl ResolutionReport {
    /// True when every record was assigned and every partition resolved.
    pub fn is_complete(&self) -> bool {
        self.unassigned.is_empty()
            && self
                .partitions
                .iter()
                .all(|p| matches!(p.outcome, PartitionOutcome::Resolved { .. }))
    }

    /// Partition failures together with their entity.
    pub fn failures(&self) -> impl Iterator<Item = (&EntityKey, &ResolveError)> {
        self.partitions.iter().filter_map(|p| match &p.outcome {
            PartitionOutcome::Failed(error) => Some((&p.entity, error)),
            _ => None,
        })
    }

    pub fn records_for<'a>(
        &'a self,
        entity: &'a EntityKey,
    ) -> impl Iterator<Item = &'a ResolvedRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| &r.record.entity == entity)
    }

    /// Time axis of every resolved, non-empty partition.
    pub fn axes(&self) -> BTreeMap<EntityKey, TimeAxis> {
        self.partitions
            .iter()
            .filter_map(|p| match p.outcome {
                PartitionOutcome::Resolved {
                    axis: Some(axis), ..
                } => Some((p.entity.clone(), axis)),
                _ => None,
            })
            .collect()
    }
}

/// Records grouped per entity, each tagged with its input position.
pub type Partitions = BTreeMap<EntityKey, Vec<(usize, Record)>>;

/// Split the input by entity. Records without a usable entity are returned
/// as errors instead of being assigned.
pub fn group_by_entity(records: Vec<Record>, fields: &FieldMapping) -> (Partitions, Vec<ResolveError>) {
    let mut partitions = Partitions::new();
    let mut unassigned = Vec::new();
    for (index, record) in records.into_iter().enumerate() {
        match fields.entity_of(index, &record) {
            Ok(entity) => partitions.entry(entity).or_default().push((index, record)),
            Err(error) => unassigned.push(error),
        }
    }
    (partitions, unassigned)
}

/// Extract, rank and fold the records of one entity.
pub fn resolve_partition(
    entity: &EntityKey,
    records: Vec<(usize, Record)>,
    fields: &FieldMapping,
    ranker: &Ranker,
) -> Result<(Option<TimeAxis>, Resolution)> {
    let mut axis: Option<TimeAxis> = None;
    let mut extracted = Vec::with_capacity(records.len());
    for (index, record) in records {
        let record = IntervalRecord::from_record(index, entity.clone(), record, fields)?;
        match axis {
            None => axis = Some(record.axis),
            Some(expected) if expected != record.axis => {
                return Err(ResolveError::invalid_interval(
                    index,
                    format!(
                        "interval is on the {} axis but entity {} uses the {} axis",
                        record.axis, entity, expected
                    ),
                ));
            }
            Some(_) => {}
        }
        extracted.push(record);
    }

    let ordered = ranker.rank(entity, extracted)?;
    let resolution = IntervalResolver::resolve(entity.clone(), ordered)?;
    Ok((axis, resolution))
}

/// Drives partition resolution, sequentially or on a rayon pool.
#[derive(Debug, Clone)]
pub struct PartitionDriver {
    fields: FieldMapping,
    ranker: Ranker,
    /// Dedicated pool size; `0` uses the global rayon pool.
    workers: usize,
    /// Minimum partition count before work is spread across threads.
    parallel_threshold: usize,
    cancel: CancellationToken,
}

impl PartitionDriver {
    pub fn new(fields: FieldMapping, ranker: Ranker) -> Self {
        Self {
            fields,
            ranker,
            workers: 0,
            parallel_threshold: crate::config::DEFAULT_PARALLEL_THRESHOLD,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn fields(&self) -> &FieldMapping {
        &self.fields
    }

    pub fn ranker(&self) -> &Ranker {
        &self.ranker
    }

    /// Resolve every entity in `records`.
    #[instrument(skip(self, records), level = "debug", fields(records = records.len()))]
    pub fn run(&self, records: Vec<Record>) -> ResolutionReport {
        let input_records = records.len();
        let (partitions, unassigned) = group_by_entity(records, &self.fields);
        for error in &unassigned {
            warn!(%error, "record not assigned to any entity");
        }

        let partitions: Vec<(EntityKey, Vec<(usize, Record)>)> = partitions.into_iter().collect();
        let partition_count = partitions.len();
        let outcomes = if partition_count >= self.parallel_threshold.max(1) {
            self.run_parallel(partitions)
        } else {
            partitions
                .into_iter()
                .map(|(entity, batch)| self.process(entity, batch))
                .collect()
        };

        let report = merge(outcomes, unassigned, input_records);
        debug!(
            partitions = report.stats.partitions,
            failed = report.stats.failed_partitions,
            skipped = report.stats.skipped_partitions,
            output = report.stats.output_records,
            "resolution finished"
        );
        report
    }

    fn run_parallel(
        &self,
        partitions: Vec<(EntityKey, Vec<(usize, Record)>)>,
    ) -> Vec<(PartitionReport, Option<Resolution>)> {
        let work = |partitions: Vec<(EntityKey, Vec<(usize, Record)>)>| {
            partitions
                .into_par_iter()
                .map(|(entity, batch)| self.process(entity, batch))
                .collect::<Vec<_>>()
        };

        if self.workers == 0 {
            return work(partitions);
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
        {
            Ok(pool) => pool.install(|| work(partitions)),
            Err(error) => {
                warn!(%error, workers = self.workers, "falling back to the global rayon pool");
                work(partitions)
            }
        }
    }

    fn process(
        &self,
        entity: EntityKey,
        batch: Vec<(usize, Record)>,
    ) -> (PartitionReport, Option<Resolution>) {
        let input_records = batch.len();
        if self.cancel.is_cancelled() {
            let report = PartitionReport {
                entity,
                input_records,
                outcome: PartitionOutcome::Skipped,
            };
            return (report, None);
        }

        match resolve_partition(&entity, batch, &self.fields, &self.ranker) {
            Ok((axis, resolution)) => {
                let report = PartitionReport {
                    entity,
                    input_records,
                    outcome: PartitionOutcome::Resolved {
                        axis,
                        records: resolution.records.len(),
                        statuses: resolution.statuses.len(),
                    },
                };
                (report, Some(resolution))
            }
            Err(error) => {
                warn!(%entity, %error, "partition failed");
                let report = PartitionReport {
                    entity,
                    input_records,
                    outcome: PartitionOutcome::Failed(error),
                };
                (report, None)
            }
        }
    }
}

/// Concatenate per-partition output in entity order.
fn merge(
    outcomes: Vec<(PartitionReport, Option<Resolution>)>,
    unassigned: Vec<ResolveError>,
    input_records: usize,
) -> ResolutionReport {
    let mut records = Vec::new();
    let mut statuses = StatusTracker::new();
    let mut partitions = Vec::with_capacity(outcomes.len());

    for (mut report, resolution) in outcomes {
        if let Some(resolution) = resolution {
            let Resolution {
                records: resolved,
                statuses: partition_statuses,
                ..
            } = resolution;
            match statuses.merge(partition_statuses) {
                Ok(()) => records.extend(resolved),
                Err(error) => {
                    warn!(entity = %report.entity, %error, "status merge rejected partition");
                    report.outcome = PartitionOutcome::Failed(error);
                }
            }
        }
        partitions.push(report);
    }

    let stats = ResolutionStats {
        input_records,
        output_records: records.len(),
        partitions: partitions.len(),
        failed_partitions: partitions
            .iter()
            .filter(|p| matches!(p.outcome, PartitionOutcome::Failed(_)))
            .count(),
        skipped_partitions: partitions
            .iter()
            .filter(|p| p.outcome == PartitionOutcome::Skipped)
            .count(),
        unassigned_records: unassigned.len(),
        statuses: statuses.tally(),
    };

    ResolutionReport {
        records,
        statuses: statuses.into_map(),
        partitions,
        unassigned,
        stats,
    }
}
