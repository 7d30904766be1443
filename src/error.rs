//! # Error Module
//!
//! Error kinds raised while consolidating intervals. Every error is scoped to
//! a single record or a single entity partition so that one bad partition can
//! be reported without disturbing the others.

use crate::model::{EntityKey, StatusKey};
use thiserror::Error;

/// Errors produced by the consolidation core.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    /// A record's start/end pair does not describe a usable half-open interval.
    #[error("invalid interval in record {record}: {reason}")]
    InvalidInterval {
        /// Position of the record in the input sequence.
        record: usize,
        /// Human-readable explanation.
        reason: String,
    },

    /// A record lacks one of the configured start, end or entity fields.
    #[error("record {record} is missing required field `{field}`")]
    MissingField { record: usize, field: String },

    /// The entity field holds a value that cannot be used as a grouping key.
    #[error("record {record} has an unusable entity value in `{field}`: {reason}")]
    InvalidEntity {
        record: usize,
        field: String,
        reason: String,
    },

    /// Strict ranking found two records the policy cannot tell apart.
    #[error("records {first} and {second} of entity {entity} share the same priority")]
    AmbiguousPriority {
        entity: EntityKey,
        first: usize,
        second: usize,
    },

    /// No priority policy is registered under the requested name.
    #[error("unknown priority policy `{0}`")]
    UnknownPolicy(String),

    /// A payload field used for ranking is missing or has the wrong kind.
    #[error("priority field `{field}` of record {record}: {reason}")]
    PriorityField {
        record: usize,
        field: String,
        reason: String,
    },

    /// A status entry was written twice for the same interval instance.
    #[error("status already recorded for {0}")]
    DuplicateStatus(StatusKey),
}

impl ResolveError {
    /// Input position of the offending record, when the error is record-scoped.
    pub fn record(&self) -> Option<usize> {
        match self {
            Self::InvalidInterval { record, .. }
            | Self::MissingField { record, .. }
            | Self::InvalidEntity { record, .. }
            | Self::PriorityField { record, .. } => Some(*record),
            Self::AmbiguousPriority { first, .. } => Some(*first),
            Self::UnknownPolicy(_) | Self::DuplicateStatus(_) => None,
        }
    }

    pub(crate) fn invalid_interval(record: usize, reason: impl Into<String>) -> Self {
        Self::InvalidInterval {
            record,
            reason: reason.into(),
        }
    }

    pub(crate) fn missing_field(record: usize, field: &str) -> Self {
        Self::MissingField {
            record,
            field: field.to_string(),
        }
    }
}

/// Result alias for the consolidation core.
pub type Result<T> = std::result::Result<T, ResolveError>;
