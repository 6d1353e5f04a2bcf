//! Thread-safe handle to a B+Tree owned by a worker task.
//!
//! [`Tree`] is cheap to clone; every clone talks to the same worker. Each call
//! creates a private `oneshot` channel, queues a command carrying it and waits
//! for the answer. Operations therefore observe one total order, the order in
//! which they entered the queue.
//!
//! # Usage
//!
//! ```
//! use bptree::{NaturalOrder, SequentialKeys, Tree, TreeError};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), TreeError> {
//! let tree = Tree::with_degree(4, SequentialKeys::starting_after(100), NaturalOrder);
//!
//! let key = tree.insert("justin".to_string()).await?;
//! assert_eq!(key, 101);
//! assert_eq!(tree.search(key).await?, "justin");
//! assert_eq!(tree.search(7).await, Err(TreeError::NotFound));
//!
//! let tree = tree.stop().await?;
//! assert_eq!(tree.node_count(), 1);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::btree::{BPlusTree, TreeError};
use crate::config::TreeConfig;
use crate::key::{KeyComparator, KeyGenerator};
use crate::worker::{Command, Responder, spawn_worker};

/// Handle to a running tree.
pub struct Tree<K, V> {
    commands: mpsc::Sender<Command<K, V>>,
    /// Published by the node store on every allocation.
    node_count: Arc<AtomicU64>,
    degree: usize,
    /// Taken by the first `stop` call.
    lifecycle: Arc<Mutex<Option<Lifecycle<K, V>>>>,
}

struct Lifecycle<K, V> {
    stop: oneshot::Sender<()>,
    worker: JoinHandle<BPlusTree<K, V>>,
}

impl<K, V> Clone for Tree<K, V> {
    #[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected for shared state
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            node_count: Arc::clone(&self.node_count),
            degree: self.degree,
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<K, V> std::fmt::Debug for Tree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("degree", &self.degree)
            .field("node_count", &self.node_count())
            .field("stopped", &self.commands.is_closed())
            .finish_non_exhaustive()
    }
}

impl<K, V> Tree<K, V>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Create a tree with one empty leaf and start its worker.
    ///
    /// # Pre-conditions
    ///
    /// - Must be called from within a Tokio runtime.
    /// - `comparator` is a consistent total order over the generated keys.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone is safe and expected for shared state
    pub fn new(
        config: TreeConfig,
        generator: impl KeyGenerator<K, V>,
        comparator: impl KeyComparator<K>,
    ) -> Self {
        let node_count = Arc::new(AtomicU64::new(0));
        let tree = BPlusTree::with_node_counter(
            config.degree(),
            Box::new(generator),
            Box::new(comparator),
            Arc::clone(&node_count),
        );
        let degree = tree.degree();

        let (commands, commands_rx) = mpsc::channel(config.queue_capacity());
        let (stop, stop_rx) = oneshot::channel();
        let worker = spawn_worker(tree, commands_rx, stop_rx, config.housekeeping_interval());

        Self {
            commands,
            node_count,
            degree,
            lifecycle: Arc::new(Mutex::new(Some(Lifecycle { stop, worker }))),
        }
    }

    /// Create a tree with the given degree and default settings otherwise.
    #[must_use]
    pub fn with_degree(
        degree: usize,
        generator: impl KeyGenerator<K, V>,
        comparator: impl KeyComparator<K>,
    ) -> Self {
        Self::new(TreeConfig::default().with_degree(degree), generator, comparator)
    }

    /// Insert `value` and return the key generated for it.
    pub async fn insert(&self, value: V) -> Result<K, TreeError> {
        self.submit(|respond_to| Command::Insert { value, respond_to })
            .await
    }

    /// Look up the value stored under `key`.
    pub async fn search(&self, key: K) -> Result<V, TreeError> {
        self.submit(|respond_to| Command::Search { key, respond_to })
            .await
    }

    /// Always fails with [`TreeError::NotImplemented`].
    pub async fn update(&self, key: K, value: V) -> Result<(), TreeError> {
        self.submit(|respond_to| Command::Update {
            key,
            value,
            respond_to,
        })
        .await
    }

    /// Always fails with [`TreeError::NotImplemented`].
    pub async fn delete(&self, key: K) -> Result<(), TreeError> {
        self.submit(|respond_to| Command::Delete { key, respond_to })
            .await
    }

    /// Blocking version of [`Self::insert`] for callers outside the runtime.
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_insert(&self, value: V) -> Result<K, TreeError> {
        self.submit_blocking(|respond_to| Command::Insert { value, respond_to })
    }

    /// Blocking version of [`Self::search`] for callers outside the runtime.
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_search(&self, key: K) -> Result<V, TreeError> {
        self.submit_blocking(|respond_to| Command::Search { key, respond_to })
    }

    /// Stop the worker and return the tree it owned.
    ///
    /// Commands still queued are not executed; their callers see
    /// [`TreeError::Stopped`]. A second call returns [`TreeError::Stopped`].
    pub async fn stop(&self) -> Result<BPlusTree<K, V>, TreeError> {
        let lifecycle = self
            .lifecycle
            .lock()
            .map_err(|_| TreeError::InternalInconsistency("lifecycle lock poisoned".to_string()))?
            .take();
        let Some(Lifecycle { stop, worker }) = lifecycle else {
            return Err(TreeError::Stopped);
        };

        // The worker may already have exited on its own.
        let _ = stop.send(());
        worker.await.map_err(|e| {
            tracing::error!("tree worker failed: {e}");
            TreeError::Stopped
        })
    }

    async fn submit<T>(
        &self,
        command: impl FnOnce(Responder<T>) -> Command<K, V>,
    ) -> Result<T, TreeError> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(command(respond_to))
            .await
            .map_err(|_| TreeError::Stopped)?;
        response.await.map_err(|_| TreeError::Stopped)?
    }

    fn submit_blocking<T>(
        &self,
        command: impl FnOnce(Responder<T>) -> Command<K, V>,
    ) -> Result<T, TreeError> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .blocking_send(command(respond_to))
            .map_err(|_| TreeError::Stopped)?;
        response.blocking_recv().map_err(|_| TreeError::Stopped)?
    }
}

impl<K, V> Tree<K, V> {
    /// Total number of nodes ever allocated.
    ///
    /// Read from a shared counter without going through the queue.
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.node_count.load(Ordering::SeqCst)
    }

    /// The effective (clamped) degree.
    #[must_use]
    pub const fn degree(&self) -> usize {
        self.degree
    }

    /// Whether the worker has stopped accepting commands.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }
}
