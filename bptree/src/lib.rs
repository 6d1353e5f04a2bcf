#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Test code may use expect()/unwrap() for convenience; library code propagates errors.
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

// Life of a request:
// 1. A caller holding a `Tree` handle invokes insert/search/update/delete
// 2. The handle wraps it in a `Command` with a private oneshot responder
// 3. The command waits in the bounded queue in front of the worker
// 4. The worker runs it against the `BPlusTree` it owns and replies
//
// Between commands the worker runs periodic housekeeping on a timer.
//
// System components:
//  - B+Tree engine (arena of nodes, split/promote, validation)
//  - Key policy (pluggable generator and comparator)
//  - Worker task and thread-safe handle

pub mod btree;
pub mod config;
pub mod key;

mod handle;
mod worker;

#[cfg(test)]
mod simulation;
#[cfg(test)]
mod testing;

pub use btree::{BPlusTree, HousekeepingReport, MIN_DEGREE, NodeId, TreeError, TreeStats};
pub use config::{ConfigError, TreeConfig};
pub use handle::Tree;
pub use key::{KeyComparator, KeyContext, KeyGenerator, NaturalOrder, SequentialKeys};
