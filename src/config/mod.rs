//! Layered configuration for consolidation runs.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! Environment variables use the `CHRONOFOLD_` prefix and `__` between nested
//! keys, e.g. `CHRONOFOLD_FIELDS__ENTITY=ACCOUNT_ID`.
//!
//! # Example config file (chronofold.toml)
//! ```toml
//! [fields]
//! start = "START_DATE"
//! end = "END_DATE"
//! entity = "ENTITY_ID"
//!
//! [priority]
//! policy = "latest-start"
//! direction = "ascending"
//! strict = false
//!
//! [partitioning]
//! workers = 0
//! parallel_threshold = 64
//!
//! [boundary]
//! input_end = "exclusive"
//! output_end = "inclusive"
//! status_field = "STATUS"
//! ```

mod defaults;

pub use defaults::*;

use crate::boundary::{BoundaryCodec, EndConvention};
use crate::error::ResolveError;
use crate::model::FieldMapping;
use crate::priority::{Direction, PolicyRegistry, RankFieldPolicy, Ranker};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Main configuration for a consolidation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Interval and entity field names
    pub fields: FieldMapping,
    /// Fold order
    pub priority: PriorityConfig,
    /// Cross-entity parallelism
    pub partitioning: PartitioningConfig,
    /// Storage end-value conventions
    pub boundary: BoundaryConfig,
}

impl ConsolidationConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment =
            Figment::new().merge(Serialized::defaults(ConsolidationConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split(ENV_SEPARATOR));

        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Built-in policies plus the configured rank field, if any.
    pub fn registry(&self) -> PolicyRegistry {
        let mut registry = PolicyRegistry::with_defaults();
        if let Some(field) = &self.priority.rank_field {
            registry.register(Arc::new(RankFieldPolicy::new(field.clone())));
        }
        registry
    }

    /// Ranker for the configured policy; fails on an unregistered name.
    pub fn ranker(&self) -> Result<Ranker, ResolveError> {
        let policy = self.registry().get(&self.priority.policy)?;
        Ok(Ranker::new(policy)
            .with_direction(self.priority.direction)
            .strict(self.priority.strict))
    }

    pub fn codec(&self) -> BoundaryCodec {
        BoundaryCodec::new(self.fields.clone())
            .with_conventions(self.boundary.input_end, self.boundary.output_end)
            .with_status_field(self.boundary.status_field.clone())
    }
}

/// Fold-order configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Registered policy name
    pub policy: String,
    /// Traversal direction over the ranked records
    pub direction: Direction,
    /// Reject records the policy cannot order
    pub strict: bool,
    /// Payload field ranked by the `rank-field` policy
    pub rank_field: Option<String>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            policy: DEFAULT_POLICY.to_string(),
            direction: Direction::Ascending,
            strict: false,
            rank_field: None,
        }
    }
}

/// Cross-entity parallelism.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitioningConfig {
    /// Dedicated worker threads (0 = global rayon pool)
    pub workers: usize,
    /// Partition count at which work goes parallel
    pub parallel_threshold: usize,
}

impl Default for PartitioningConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

/// Storage conventions for the `end` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    /// Convention of end values in the input
    pub input_end: EndConvention,
    /// Convention of end values written back
    pub output_end: EndConvention,
    /// Column receiving the final status label on export
    pub status_field: Option<String>,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            input_end: EndConvention::Exclusive,
            output_end: EndConvention::Inclusive,
            status_field: None,
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<PriorityOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
