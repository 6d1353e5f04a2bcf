use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::btree::BPlusTree;
use crate::key::{KeyContext, NaturalOrder};

/// Route `tracing` output through the test harness.
///
/// Safe to call from every test; only the first call installs a subscriber.
/// Filtering follows `RUST_LOG` and defaults to `bptree=debug`.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bptree=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// Create a tree whose keys are the values themselves.
pub fn new_identity_tree(degree: usize) -> BPlusTree<u64, u64> {
    BPlusTree::new(degree, |_ctx: &KeyContext, value: &u64| *value, NaturalOrder)
}
