//! Common test utilities.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//!
//! #[tokio::test]
//! async fn my_test() {
//!     common::init_tracing();
//!     // ... test code with tracing::info!, tracing::debug!, etc.
//! }
//! ```
//!
//! Filtering follows `RUST_LOG` and defaults to `bptree=debug`.

#![allow(dead_code)]

use bptree::{BPlusTree, KeyContext, NaturalOrder};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a test-friendly subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bptree=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A tree keyed by the values themselves.
pub fn identity_tree(degree: usize) -> BPlusTree<u64, u64> {
    BPlusTree::new(degree, |_ctx: &KeyContext, value: &u64| *value, NaturalOrder)
}
