//! # Priority Module
//!
//! Decides the order in which an entity's records are folded into the
//! resolver. Records folded later win every conflict, so the ranker sorts
//! from lowest to highest priority.

use crate::error::{ResolveError, Result};
use crate::model::{EntityKey, FieldValue, IntervalRecord};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Name of the default policy.
pub const LATEST_START: &str = "latest-start";

/// Name under which a configured [`RankFieldPolicy`] is registered.
pub const RANK_FIELD: &str = "rank-field";

/// Totally ordered fold key; compared part by part.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriorityKey(Vec<i64>);

impl PriorityKey {
    pub fn new(parts: impl IntoIterator<Item = i64>) -> Self {
        Self(parts.into_iter().collect())
    }

    pub fn parts(&self) -> &[i64] {
        &self.0
    }
}

/// A strategy producing fold keys.
///
/// Any total order is acceptable as long as it is stable for one run.
pub trait PriorityPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn key(&self, record: &IntervalRecord) -> Result<PriorityKey>;
}

/// Earlier starts fold first; among equal starts, later ends fold first so a
/// shorter interval with the same start can carve the longer one.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestStartWins;

impl PriorityPolicy for LatestStartWins {
    fn name(&self) -> &str {
        LATEST_START
    }

    fn key(&self, record: &IntervalRecord) -> Result<PriorityKey> {
        Ok(PriorityKey::new([
            record.interval.start,
            record.interval.end.saturating_neg(),
        ]))
    }
}

/// Ranks by an integer, boolean, date or timestamp payload field, falling back to
/// [`LatestStartWins`] between records of equal rank.
#[derive(Debug, Clone)]
pub struct RankFieldPolicy {
    field: String,
}

impl RankFieldPolicy {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }

    fn rank(&self, record: &IntervalRecord) -> Result<i64> {
        let error = |reason: String| ResolveError::PriorityField {
            record: record.source,
            field: self.field.clone(),
            reason,
        };
        match record.payload.get(&self.field) {
            Some(FieldValue::Int(rank)) => Ok(*rank),
            Some(FieldValue::Bool(rank)) => Ok(i64::from(*rank)),
            Some(other) => match other.instant() {
                Some((_, rank)) => Ok(rank),
                None => Err(error(format!("{} values cannot be ranked", other.kind()))),
            },
            None => Err(error("field is missing".to_string())),
        }
    }
}

impl PriorityPolicy for RankFieldPolicy {
    fn name(&self) -> &str {
        RANK_FIELD
    }

    fn key(&self, record: &IntervalRecord) -> Result<PriorityKey> {
        let rank = self.rank(record)?;
        let tail = LatestStartWins.key(record)?;
        Ok(PriorityKey::new(
            std::iter::once(rank).chain(tail.parts().iter().copied()),
        ))
    }
}

/// Traversal direction over the ranked sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    Ascending,
    /// Reverses the whole ascending traversal, ties included.
    Descending,
}

/// Orders one entity's records for folding.
#[derive(Debug, Clone)]
pub struct Ranker {
    policy: Arc<dyn PriorityPolicy>,
    direction: Direction,
    strict: bool,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(Arc::new(LatestStartWins))
    }
}

impl Ranker {
    pub fn new(policy: Arc<dyn PriorityPolicy>) -> Self {
        Self {
            policy,
            direction: Direction::Ascending,
            strict: false,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// In strict mode equal keys are an error instead of falling back to
    /// input order.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sort `records` into fold order.
    pub fn rank(
        &self,
        entity: &EntityKey,
        records: Vec<IntervalRecord>,
    ) -> Result<Vec<IntervalRecord>> {
        let mut keyed = records
            .into_iter()
            .map(|record| Ok((self.policy.key(&record)?, record)))
            .collect::<Result<Vec<_>>>()?;

        // Stable: ties keep input order.
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        if self.strict {
            if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                return Err(ResolveError::AmbiguousPriority {
                    entity: entity.clone(),
                    first: pair[0].1.source,
                    second: pair[1].1.source,
                });
            }
        }

        let mut ordered: Vec<IntervalRecord> = keyed.into_iter().map(|(_, record)| record).collect();
        if self.direction == Direction::Descending {
            ordered.reverse();
        }
        Ok(ordered)
    }
}

/// Named policies, populated at startup and looked up by configuration.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    policies: FxHashMap<String, Arc<dyn PriorityPolicy>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`LatestStartWins`] registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(LatestStartWins));
        registry
    }

    /// Register a policy under its own name, replacing any previous entry.
    pub fn register(&mut self, policy: Arc<dyn PriorityPolicy>) -> &mut Self {
        self.policies.insert(policy.name().to_string(), policy);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PriorityPolicy>> {
        self.policies
            .get(name)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownPolicy(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
