//! Module configuration.
//!
//! [`RoyaltyConfig`] starts from the protocol constants and can be
//! overridden by an optional TOML/JSON file and then by `LINEAGE_*`
//! environment variables (e.g. `LINEAGE_SNAPSHOT_INTERVAL_SECS=3600`).

use std::path::Path;

use config::{Config, Environment, File};
use lineage_core::constants::{
    DEFAULT_SNAPSHOT_INTERVAL_SECS, MAX_ANCESTORS, MAX_PARENTS, MAX_ROYALTY_STACK, PERCENT_DENOMINATOR,
};
use lineage_policy::StackLimits;
use serde::{Deserialize, Serialize};

use crate::error::ModuleError;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LINEAGE";

/// Tunable protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoyaltyConfig {
    /// Minimum seconds between two snapshots of one vault.
    pub snapshot_interval_secs: u64,
    /// Maximum parents per stack link.
    pub max_parents: usize,
    /// Maximum distinct ancestors of a stack-linked node.
    pub max_ancestors: usize,
    /// Cap on a node's royalty stack, in percent units.
    pub max_royalty_stack: u64,
}

impl Default for RoyaltyConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_secs: DEFAULT_SNAPSHOT_INTERVAL_SECS,
            max_parents: MAX_PARENTS,
            max_ancestors: MAX_ANCESTORS,
            max_royalty_stack: MAX_ROYALTY_STACK,
        }
    }
}

impl RoyaltyConfig {
    /// Load from `path` (if given) layered under `LINEAGE_*` environment
    /// variables, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ModuleError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let cfg: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| ModuleError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject parameter combinations the protocol cannot honor.
    pub fn validate(&self) -> Result<(), ModuleError> {
        if self.snapshot_interval_secs == 0 {
            return Err(ModuleError::Config("snapshot_interval_secs must be positive".into()));
        }
        if self.max_parents == 0 {
            return Err(ModuleError::Config("max_parents must be positive".into()));
        }
        if self.max_ancestors < self.max_parents {
            return Err(ModuleError::Config(format!(
                "max_ancestors {} is below max_parents {}",
                self.max_ancestors, self.max_parents
            )));
        }
        if self.max_royalty_stack > PERCENT_DENOMINATOR {
            return Err(ModuleError::Config(format!(
                "max_royalty_stack {} exceeds {PERCENT_DENOMINATOR}",
                self.max_royalty_stack
            )));
        }
        Ok(())
    }

    /// Limits handed to the ancestor-stack policy.
    pub fn stack_limits(&self) -> StackLimits {
        StackLimits {
            max_parents: self.max_parents,
            max_ancestors: self.max_ancestors,
            max_royalty_stack: self.max_royalty_stack,
        }
    }
}
