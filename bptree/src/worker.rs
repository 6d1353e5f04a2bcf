//! The task that owns a tree and executes its commands.
//!
//! Every operation on a [`crate::Tree`] becomes a [`Command`] on a bounded
//! queue. One worker task receives them in order and runs each to completion
//! before looking at the next, so the tree itself needs no locks.
//!
//! # Design
//!
//! The loop selects over three sources, in priority order:
//! - the stop signal, which ends the loop without draining the queue
//! - the housekeeping timer, so a queue that never empties cannot starve it
//! - the command queue; when every sender is gone the loop ends as well
//!
//! After leaving the loop the worker runs one last housekeeping pass and
//! returns the tree through its `JoinHandle`.
//!
//! # Invariants
//! - Commands execute one at a time in queue order
//! - Each result goes only to the responder of the command that produced it
//! - A failed command never stops the loop

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use crate::btree::{BPlusTree, TreeError};

/// Private result channel of one command.
pub type Responder<T> = oneshot::Sender<Result<T, TreeError>>;

/// A unit of work for the worker.
pub enum Command<K, V> {
    Insert {
        value: V,
        respond_to: Responder<K>,
    },
    Search {
        key: K,
        respond_to: Responder<V>,
    },
    Update {
        key: K,
        value: V,
        respond_to: Responder<()>,
    },
    Delete {
        key: K,
        respond_to: Responder<()>,
    },
}

impl<K, V> Command<K, V> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Search { .. } => "search",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Spawn the worker task for `tree`.
///
/// # Arguments
/// * `tree` - The tree, owned by the task from now on
/// * `commands` - Receiving end of the command queue
/// * `stop` - Fires (or is dropped) to end the loop
/// * `housekeeping_interval` - Time between maintenance passes
///
/// # Returns
/// A `JoinHandle` resolving to the tree once the worker has stopped.
pub fn spawn_worker<K, V>(
    tree: BPlusTree<K, V>,
    commands: mpsc::Receiver<Command<K, V>>,
    stop: oneshot::Receiver<()>,
    housekeeping_interval: Duration,
) -> tokio::task::JoinHandle<BPlusTree<K, V>>
where
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    tokio::spawn(async move { worker_loop(tree, commands, stop, housekeeping_interval).await })
}

/// The main worker loop.
async fn worker_loop<K: Clone + 'static, V: Clone + 'static>(
    mut tree: BPlusTree<K, V>,
    mut commands: mpsc::Receiver<Command<K, V>>,
    mut stop: oneshot::Receiver<()>,
    housekeeping_interval: Duration,
) -> BPlusTree<K, V> {
    let mut ticker =
        tokio::time::interval_at(Instant::now() + housekeeping_interval, housekeeping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        "tree worker started: degree={}, housekeeping every {:?}",
        tree.degree(),
        housekeeping_interval
    );

    loop {
        tokio::select! {
            biased;

            _ = &mut stop => {
                tracing::debug!("tree worker received stop signal");
                break;
            }
            _ = ticker.tick() => housekeeping(&mut tree),
            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!("all tree handles dropped");
                    break;
                };
                execute(&mut tree, command);
            }
        }
    }

    housekeeping(&mut tree);
    tracing::info!(
        "tree worker stopped: {} nodes, {} entries",
        tree.node_count(),
        tree.len()
    );
    tree
}

/// Run one command against the tree and hand the result to its caller.
pub fn execute<K: Clone + 'static, V: Clone + 'static>(
    tree: &mut BPlusTree<K, V>,
    command: Command<K, V>,
) {
    let name = command.name();
    match command {
        Command::Insert { value, respond_to } => {
            let result = tree.insert(value);
            if let Err(e) = &result {
                tracing::warn!("insert failed: {e}");
            }
            respond(respond_to, result, name);
        }
        Command::Search { key, respond_to } => {
            respond(respond_to, tree.search(&key).cloned(), name);
        }
        Command::Update {
            key,
            value,
            respond_to,
        } => respond(respond_to, tree.update(&key, value), name),
        Command::Delete { key, respond_to } => respond(respond_to, tree.delete(&key), name),
    }
}

fn respond<T>(respond_to: Responder<T>, result: Result<T, TreeError>, name: &str) {
    if respond_to.send(result).is_err() {
        tracing::debug!("caller went away before {name} completed");
    }
}

fn housekeeping<K: Clone + 'static, V: 'static>(tree: &mut BPlusTree<K, V>) {
    let report = tree.housekeeping();
    tracing::trace!(
        "housekeeping pass {}: {} nodes, {} entries, {} dirty",
        report.pass,
        report.node_count,
        report.entries,
        report.dirty_nodes
    );
}
