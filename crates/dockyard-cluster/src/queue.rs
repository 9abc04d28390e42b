//! Dispatch queue — bounded in-memory FIFO between the drain loop and the
//! task-pull handler.
//!
//! `push` waits for free capacity, which back-pressures the drain loop.
//! `try_pop` never waits for an item: an empty queue answers `None`
//! immediately. Pops are serialized, so concurrent pullers each win a
//! distinct task.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::error::{ClusterError, ClusterResult};
use crate::task::TaskSpec;

/// Reference capacity of the dispatch queue.
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<TaskSpec>,
    rx: Arc<Mutex<mpsc::Receiver<TaskSpec>>>,
    capacity: usize,
}

impl DispatchQueue {
    /// Create a queue holding at most `capacity` tasks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
        }
    }

    /// Enqueue a task, waiting while the queue is full.
    pub async fn push(&self, task: TaskSpec) -> ClusterResult<()> {
        self.tx.send(task).await.map_err(|_| ClusterError::QueueClosed)
    }

    /// Take the oldest task, if any.
    pub async fn try_pop(&self) -> Option<TaskSpec> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Tasks currently waiting.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for DispatchQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
