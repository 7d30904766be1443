//! Default constants for chronofold configuration.
//!
//! All magic numbers and default field names are centralized here.

// =============================================================================
// Field Defaults
// =============================================================================

/// Default name of the inclusive start field
pub const DEFAULT_START_FIELD: &str = "START_DATE";

/// Default name of the end field
pub const DEFAULT_END_FIELD: &str = "END_DATE";

// =============================================================================
// Priority Defaults
// =============================================================================

/// Policy used when none is configured
pub const DEFAULT_POLICY: &str = crate::priority::LATEST_START;

// =============================================================================
// Partitioning Defaults
// =============================================================================

/// Minimum number of entity partitions before work is spread over threads.
/// Below this, thread hand-off costs more than the fold itself.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64;

/// Default worker count; `0` means the global rayon pool.
pub const DEFAULT_WORKERS: usize = 0;

// =============================================================================
// Environment
// =============================================================================

/// Prefix of environment variables read by [`super::ConsolidationConfig::load`]
pub const ENV_PREFIX: &str = "CHRONOFOLD_";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";
