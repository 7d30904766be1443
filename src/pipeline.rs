//! # Pipeline Module
//!
//! Table-level orchestration around consolidation. Steps are looked up by
//! name in a [`StepRegistry`] and every outcome is appended to a
//! [`RunReport`]; a failing table is recorded and the run moves on.
//!
//! ```text
//! for each TablePlan:
//!     executed        table present?
//!     post_processed  optional step (e.g. standardize-date-intervals)
//!     validated       primary key + named validation steps
//! ```

use crate::boundary::EndConvention;
use crate::model::{EntityKey, FieldMapping, Record};
use crate::resolver::first_overlap;
use crate::temporal::Interval;
use crate::Consolidator;
use anyhow::{anyhow, bail, Context};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Registered name of the consolidation step.
pub const STANDARDIZE_INTERVALS: &str = "standardize-date-intervals";
/// Registered name of the non-overlap validation step.
pub const NON_OVERLAP: &str = "non-overlapping-intervals";

/// Named in-memory record collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(name: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no step registered under `{0}`")]
    UnknownStep(String),
}

/// What a step did to its table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub records_in: usize,
    pub records_out: usize,
}

/// A post-processing or validation step over one table.
pub trait TableStep: Send + Sync {
    fn name(&self) -> &str;

    /// Apply the step. On error the table must be left as it was.
    fn apply(&self, table: &mut Table) -> anyhow::Result<StepSummary>;
}

/// Replace a table's records with their consolidated intervals.
#[derive(Debug, Clone)]
pub struct StandardizeIntervals {
    consolidator: Consolidator,
}

impl StandardizeIntervals {
    pub fn new(consolidator: Consolidator) -> Self {
        Self { consolidator }
    }
}

impl TableStep for StandardizeIntervals {
    fn name(&self) -> &str {
        STANDARDIZE_INTERVALS
    }

    fn apply(&self, table: &mut Table) -> anyhow::Result<StepSummary> {
        let records_in = table.records.len();
        let report = self.consolidator.run(table.records.clone());
        if !report.is_complete() {
            let mut reasons: Vec<String> = report
                .failures()
                .map(|(entity, error)| format!("entity {entity}: {error}"))
                .collect();
            reasons.extend(report.unassigned.iter().map(ToString::to_string));
            if report.stats.skipped_partitions > 0 {
                reasons.push(format!(
                    "{} partitions cancelled",
                    report.stats.skipped_partitions
                ));
            }
            bail!("{}", reasons.join("; "));
        }
        let records = self.consolidator.export(&report)?;
        table.records = records;
        Ok(StepSummary {
            records_in,
            records_out: table.records.len(),
        })
    }
}

/// Fails when two records of one entity overlap.
#[derive(Debug, Clone)]
pub struct NonOverlapValidator {
    fields: FieldMapping,
    end: EndConvention,
}

impl NonOverlapValidator {
    /// `end` is the convention the table's end values are stored in.
    pub fn new(fields: FieldMapping, end: EndConvention) -> Self {
        Self { fields, end }
    }
}

impl TableStep for NonOverlapValidator {
    fn name(&self) -> &str {
        NON_OVERLAP
    }

    fn apply(&self, table: &mut Table) -> anyhow::Result<StepSummary> {
        let mut spans: Vec<(EntityKey, Interval)> = Vec::with_capacity(table.records.len());
        for (index, record) in table.records.iter().enumerate() {
            let entity = self.fields.entity_of(index, record)?;
            let (_, start) = self.fields.boundary(index, record, &self.fields.start)?;
            let (_, end) = self.fields.boundary(index, record, &self.fields.end)?;
            let interval = Interval::new(start, self.end.ingest(end))
                .ok_or_else(|| anyhow!("record {index}: empty interval"))?;
            spans.push((entity, interval));
        }
        if let Some((entity, left, right)) =
            first_overlap(spans.iter().map(|(entity, interval)| (entity, *interval)))
        {
            bail!("entity {entity}: {left} overlaps {right}");
        }
        Ok(StepSummary {
            records_in: table.records.len(),
            records_out: table.records.len(),
        })
    }
}

/// Fails when the key columns do not identify records uniquely.
#[derive(Debug, Clone)]
pub struct PrimaryKeyValidator {
    columns: Vec<String>,
}

impl PrimaryKeyValidator {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }
}

impl TableStep for PrimaryKeyValidator {
    fn name(&self) -> &str {
        "primary-key"
    }

    fn apply(&self, table: &mut Table) -> anyhow::Result<StepSummary> {
        let mut counts: BTreeMap<Vec<String>, usize> = BTreeMap::new();
        for (index, record) in table.records.iter().enumerate() {
            let key = self
                .columns
                .iter()
                .map(|column| {
                    record
                        .get(column)
                        .map(ToString::to_string)
                        .with_context(|| format!("record {index}: missing key column `{column}`"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            *counts.entry(key).or_default() += 1;
        }
        let duplicates = counts.values().filter(|count| **count > 1).count();
        if duplicates > 0 {
            bail!("{duplicates} duplicate primary key values found");
        }
        Ok(StepSummary {
            records_in: table.records.len(),
            records_out: table.records.len(),
        })
    }
}

/// Steps by name, populated at startup.
#[derive(Default, Clone)]
pub struct StepRegistry {
    steps: FxHashMap<String, Arc<dyn TableStep>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in steps over one consolidation setup.
    pub fn with_defaults(consolidator: Consolidator) -> Self {
        let fields = consolidator.codec().fields().clone();
        let stored_end = consolidator.codec().output_end();
        let mut registry = Self::new();
        registry
            .register(Arc::new(NonOverlapValidator::new(fields, stored_end)))
            .register(Arc::new(StandardizeIntervals::new(consolidator)));
        registry
    }

    pub fn register(&mut self, step: Arc<dyn TableStep>) -> &mut Self {
        self.steps.insert(step.name().to_string(), step);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn TableStep>, PipelineError> {
        self.steps
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownStep(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("steps", &self.names())
            .finish()
    }
}

/// What to do with one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablePlan {
    pub table: String,
    pub post_process: Option<String>,
    /// Columns that must identify a record uniquely; empty skips the check.
    pub primary_key: Vec<String>,
    pub validations: Vec<String>,
}

impl TablePlan {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn post_process(mut self, step: impl Into<String>) -> Self {
        self.post_process = Some(step.into());
        self
    }

    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(mut self, step: impl Into<String>) -> Self {
        self.validations.push(step.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Executed,
    PostProcessed,
    Validated,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Executed,
        Category::PostProcessed,
        Category::Validated,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Category::Executed => "Executed",
            Category::PostProcessed => "Post Processing",
            Category::Validated => "Validation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Skipped,
    Failure(String),
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failure(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub category: Category,
    /// Table name, or `table/step` for validations.
    pub subject: String,
    pub outcome: StepOutcome,
}

/// Append-only record of a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, category: Category, subject: impl Into<String>, outcome: StepOutcome) {
        self.entries.push(ReportEntry {
            category,
            subject: subject.into(),
            outcome,
        });
    }

    pub fn merge(&mut self, other: RunReport) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn category(&self, category: Category) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.category == category)
    }

    /// No step failed. Skipped steps do not fail a run.
    pub fn is_pass(&self) -> bool {
        !self.entries.iter().any(|entry| entry.outcome.is_failure())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== Pipeline Report =====")?;
        for category in Category::ALL {
            let entries: Vec<&ReportEntry> = self.category(category).collect();
            if entries.is_empty() {
                continue;
            }
            let successes = entries
                .iter()
                .filter(|e| e.outcome == StepOutcome::Success)
                .count();
            writeln!(
                f,
                "{}: {}/{} successful.",
                category.title(),
                successes,
                entries.len()
            )?;
            for entry in entries {
                match &entry.outcome {
                    StepOutcome::Success => writeln!(f, "   + {}", entry.subject)?,
                    StepOutcome::Skipped => writeln!(f, "   ~ {} (skipped)", entry.subject)?,
                    StepOutcome::Failure(reason) => {
                        writeln!(f, "   - {}: {}", entry.subject, reason)?
                    }
                }
            }
        }
        let status = if self.is_pass() { "PASS" } else { "FAIL" };
        write!(f, "Pipeline Status: {status}")
    }
}

/// Runs table plans against a step registry.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: StepRegistry,
}

impl Pipeline {
    pub fn new(registry: StepRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Run every plan. Tables without a plan pass through untouched.
    #[instrument(skip_all, level = "debug", fields(tables = tables.len(), plans = plans.len()))]
    pub fn run(&self, tables: Vec<Table>, plans: &[TablePlan]) -> (Vec<Table>, RunReport) {
        let mut tables = tables;
        let mut report = RunReport::new();
        for plan in plans {
            let table_report = match tables.iter_mut().find(|t| t.name == plan.table) {
                Some(table) => self.run_table(table, plan),
                None => self.missing_table(plan),
            };
            report.merge(table_report);
        }
        if report.is_pass() {
            info!("pipeline completed successfully");
        } else {
            warn!("pipeline completed with errors");
        }
        (tables, report)
    }

    fn run_table(&self, table: &mut Table, plan: &TablePlan) -> RunReport {
        let mut report = RunReport::new();
        info!(table = %table.name, records = table.records.len(), "running table");
        report.record(Category::Executed, &table.name, StepOutcome::Success);

        if let Some(step) = &plan.post_process {
            let outcome = self.apply(step, table);
            report.record(Category::PostProcessed, &table.name, outcome);
        }

        if !plan.primary_key.is_empty() {
            let step = PrimaryKeyValidator::new(plan.primary_key.clone());
            let result = step.apply(table);
            let outcome = outcome_of(step.name(), &table.name, result);
            report.record(
                Category::Validated,
                format!("{}/{}", table.name, step.name()),
                outcome,
            );
        }
        for step in &plan.validations {
            let outcome = self.apply(step, table);
            report.record(Category::Validated, format!("{}/{}", table.name, step), outcome);
        }
        report
    }

    fn missing_table(&self, plan: &TablePlan) -> RunReport {
        warn!(table = %plan.table, "table not found");
        let mut report = RunReport::new();
        report.record(
            Category::Executed,
            &plan.table,
            StepOutcome::Failure("table does not exist".to_string()),
        );
        if plan.post_process.is_some() {
            report.record(Category::PostProcessed, &plan.table, StepOutcome::Skipped);
        }
        if !plan.primary_key.is_empty() {
            let step = PrimaryKeyValidator::new(plan.primary_key.clone());
            report.record(
                Category::Validated,
                format!("{}/{}", plan.table, step.name()),
                StepOutcome::Skipped,
            );
        }
        for step in &plan.validations {
            report.record(
                Category::Validated,
                format!("{}/{}", plan.table, step),
                StepOutcome::Skipped,
            );
        }
        report
    }

    fn apply(&self, step: &str, table: &mut Table) -> StepOutcome {
        match self.registry.get(step) {
            Ok(found) => {
                let result = found.apply(table);
                outcome_of(step, &table.name, result)
            }
            Err(error) => {
                warn!(table = %table.name, %error, "step lookup failed");
                StepOutcome::Failure(error.to_string())
            }
        }
    }
}

fn outcome_of(step: &str, table: &str, result: anyhow::Result<StepSummary>) -> StepOutcome {
    match result {
        Ok(summary) => {
            info!(
                table,
                step,
                records_in = summary.records_in,
                records_out = summary.records_out,
                "step succeeded"
            );
            StepOutcome::Success
        }
        Err(error) => {
            warn!(table, step, error = %format!("{error:#}"), "step failed");
            StepOutcome::Failure(format!("{error:#}"))
        }
    }
}
