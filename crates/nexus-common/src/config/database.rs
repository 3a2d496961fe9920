//! Database configuration structures.
//!
//! These structures define the configurable aspects of the execution layer's
//! resource tracking and of the lock table it hands locks back to.

use serde::{Deserialize, Serialize};

use crate::constants::{RESOURCE_ARRAY_INITIAL_CAPACITY, UNLIMITED_LOCKS_PER_TXN};
use crate::error::{NexusError, NexusResult};

/// Main database configuration.
///
/// This is the top-level configuration structure that contains all
/// component configurations.
///
/// # Example
///
/// ```rust
/// use nexus_common::config::DatabaseConfig;
///
/// let config = DatabaseConfig::default();
/// assert_eq!(config.resource_owner.initial_capacity, 16);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Resource owner configuration.
    #[serde(default)]
    pub resource_owner: ResourceOwnerConfig,

    /// Lock table configuration.
    #[serde(default)]
    pub lock: LockConfig,
}

impl DatabaseConfig {
    /// Creates a minimal configuration for testing.
    ///
    /// Registries start tiny so that tests exercise the growth path.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            resource_owner: ResourceOwnerConfig {
                initial_capacity: 2,
                ..Default::default()
            },
            lock: LockConfig::default(),
        }
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> NexusResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| NexusError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration to TOML.
    pub fn to_toml(&self) -> NexusResult<String> {
        toml::to_string_pretty(self).map_err(|e| NexusError::InvalidConfig {
            message: e.to_string(),
        })
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> NexusResult<()> {
        self.resource_owner.validate()
    }
}

/// Resource owner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceOwnerConfig {
    /// Number of slots a resource array gets on its first growth.
    /// Each later growth doubles the capacity.
    /// Default: 16
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Emit a warning for every resource still held when a scope commits.
    /// Release proceeds either way.
    /// Default: true
    #[serde(default = "default_warn_on_leaks")]
    pub warn_on_leaks: bool,
}

fn default_initial_capacity() -> usize {
    RESOURCE_ARRAY_INITIAL_CAPACITY
}

fn default_warn_on_leaks() -> bool {
    true
}

impl Default for ResourceOwnerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: default_initial_capacity(),
            warn_on_leaks: default_warn_on_leaks(),
        }
    }
}

impl ResourceOwnerConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> NexusResult<()> {
        if self.initial_capacity == 0 {
            return Err(NexusError::InvalidConfig {
                message: "resource_owner.initial_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Lock table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Maximum number of distinct locks one transaction may hold.
    /// 0 means unlimited.
    /// Default: 0
    #[serde(default)]
    pub max_locks_per_txn: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_locks_per_txn: UNLIMITED_LOCKS_PER_TXN,
        }
    }
}

impl LockConfig {
    /// Returns true if the per-transaction limit is enforced.
    #[must_use]
    pub const fn is_limited(&self) -> bool {
        self.max_locks_per_txn != UNLIMITED_LOCKS_PER_TXN
    }
}
