//! Key ordering and key generation strategies.
//!
//! The tree never inspects keys itself. Ordering comes from a
//! [`KeyComparator`] and every inserted value gets its key from a
//! [`KeyGenerator`]. Both are supplied when the tree is built and stay fixed
//! for its lifetime.
//!
//! # Invariants
//!
//! - The comparator must define a total order and be consistent: the same
//!   pair of keys always compares the same way.
//! - The generator is called exactly once per insertion, on the worker task.

use std::cmp::Ordering;

/// Three-way comparison of keys.
pub trait KeyComparator<K>: Send + Sync + 'static {
    /// Compare `a` against `b`.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

impl<K, F> KeyComparator<K> for F
where
    F: Fn(&K, &K) -> Ordering + Send + Sync + 'static,
{
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

/// Read-only view of the tree handed to a [`KeyGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyContext {
    /// Branching factor of the tree (already clamped).
    pub degree: usize,
    /// Nodes allocated so far.
    pub node_count: u64,
    /// Entries stored so far, not counting the one being inserted.
    pub entry_count: usize,
    /// Housekeeping passes completed so far.
    pub housekeeping_passes: u64,
}

/// Derives the key for a value at insertion time.
pub trait KeyGenerator<K, V>: Send + 'static {
    /// Produce the key under which `value` is stored.
    fn generate(&mut self, ctx: &KeyContext, value: &V) -> K;
}

impl<K, V, F> KeyGenerator<K, V> for F
where
    F: FnMut(&KeyContext, &V) -> K + Send + 'static,
{
    fn generate(&mut self, ctx: &KeyContext, value: &V) -> K {
        self(ctx, value)
    }
}

/// Comparator for any key type with a natural [`Ord`] implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl<K: Ord> KeyComparator<K> for NaturalOrder {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Auto-incrementing `u64` keys.
///
/// The first generated key is `seed + 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialKeys {
    last: u64,
}

impl SequentialKeys {
    /// Start generating keys after `seed`.
    #[must_use]
    pub const fn starting_after(seed: u64) -> Self {
        Self { last: seed }
    }

    /// The most recently generated key, or the seed if none was generated.
    #[must_use]
    pub const fn last(&self) -> u64 {
        self.last
    }
}

impl<V> KeyGenerator<u64, V> for SequentialKeys {
    fn generate(&mut self, _ctx: &KeyContext, _value: &V) -> u64 {
        self.last = self.last.wrapping_add(1);
        self.last
    }
}
