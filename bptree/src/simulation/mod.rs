//! Deterministic simulation of tree workloads.
//!
//! This module drives a [`crate::BPlusTree`] with:
//! - Reproducible random operation sequences
//! - Randomly generated (and frequently duplicated) keys
//! - An oracle of every value inserted under every key
//! - Structural invariant checks after each operation
//!
//! # Design Principles
//!
//! 1. All randomness is seeded for reproducibility
//! 2. Given the same seed, execution is identical
//! 3. The tree is validated after every single operation, not only at the end
//!
//! # Usage
//!
//! ```ignore
//! use simulation::{Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345) // seed
//!     .with_degree(4)
//!     .with_key_space(64);
//!
//! let mut sim = Simulator::new(config);
//! let result = sim.run(1000); // Run 1000 operations
//!
//! assert!(result.invariant_violations.is_empty());
//! ```

mod simulator;

pub use invariants::{InvariantChecker, InvariantViolation, OperationHistory};
pub use operation_gen::{Operation, OperationGenConfig, OperationGenerator};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
