//! Tree configuration module.
//!
//! This module provides the tunables of a [`crate::Tree`] and loading them
//! from environment variables.
//!
//! # Environment Variables
//!
//! - `BPTREE_DEGREE`: Branching factor (default: `64`, minimum `3`)
//! - `BPTREE_QUEUE_CAPACITY`: Commands that may wait for the worker before
//!   callers are held back (default: `1024`, minimum `1`)
//! - `BPTREE_HOUSEKEEPING_INTERVAL_MS`: Milliseconds between maintenance passes
//!   (default: `3000`, minimum `1`)
//!
//! # Invariants
//!
//! - `degree()` is always at least [`MIN_DEGREE`]
//! - `queue_capacity()` is always at least 1
//! - `housekeeping_interval()` is never zero

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::btree::MIN_DEGREE;

/// Tree configuration.
///
/// Fields hold the values as given; the accessors apply the minimums. The
/// struct can be embedded in a host component's own serde configuration, any
/// missing field takes its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Branching factor. Leaves hold up to `degree - 1` keys, internal nodes
    /// up to `degree`.
    pub degree: usize,
    /// Capacity of the command queue in front of the worker.
    pub queue_capacity: usize,
    /// Milliseconds between periodic housekeeping passes.
    pub housekeeping_interval_ms: u64,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            degree: Self::DEFAULT_DEGREE,
            queue_capacity: Self::DEFAULT_QUEUE_CAPACITY,
            housekeeping_interval_ms: Self::DEFAULT_HOUSEKEEPING_INTERVAL_MS,
        }
    }
}

impl TreeConfig {
    /// Default branching factor.
    pub const DEFAULT_DEGREE: usize = 64;
    /// Default command queue capacity.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
    /// Default housekeeping interval.
    pub const DEFAULT_HOUSEKEEPING_INTERVAL_MS: u64 = 3000;

    const DEGREE_VAR: &'static str = "BPTREE_DEGREE";
    const QUEUE_CAPACITY_VAR: &'static str = "BPTREE_QUEUE_CAPACITY";
    const HOUSEKEEPING_INTERVAL_VAR: &'static str = "BPTREE_HOUSEKEEPING_INTERVAL_MS";

    /// Set the branching factor.
    #[must_use]
    pub const fn with_degree(mut self, degree: usize) -> Self {
        self.degree = degree;
        self
    }

    /// Set the command queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the housekeeping interval.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // intervals beyond u64 millis are not meaningful
    pub const fn with_housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Effective branching factor.
    #[must_use]
    pub fn degree(&self) -> usize {
        self.degree.max(MIN_DEGREE)
    }

    /// Effective command queue capacity.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Effective housekeeping interval.
    #[must_use]
    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_millis(self.housekeeping_interval_ms.max(1))
    }

    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but is not a non-negative integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            degree: Self::load(&lookup, Self::DEGREE_VAR)?.unwrap_or(defaults.degree),
            queue_capacity: Self::load(&lookup, Self::QUEUE_CAPACITY_VAR)?
                .unwrap_or(defaults.queue_capacity),
            housekeeping_interval_ms: Self::load(&lookup, Self::HOUSEKEEPING_INTERVAL_VAR)?
                .unwrap_or(defaults.housekeeping_interval_ms),
        })
    }

    /// Parse one variable.
    ///
    /// Returns `None` if the variable is not set.
    fn load<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        name: &str,
    ) -> Result<Option<T>, ConfigError> {
        let Some(value) = lookup(name) else {
            return Ok(None);
        };
        value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a non-negative integer"),
            })
    }
}
