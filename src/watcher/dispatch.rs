//! Worker pool applying watch events.
//!
//! Events are partitioned by [`PathFilter::partition_key`], so all events
//! for one top-level subtree go to the same worker and are applied in the
//! order they arrived. Each worker owns its own store connection.
//!
//! A move between two subtrees owned by different workers touches both
//! partitions. The move goes to the source's worker and a fence to the
//! destination's; the two meet at a [`Barrier`] before the move is applied
//! and again after, so neither worker runs ahead of the move.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher as _};
use std::path::Path;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

use super::events::WatchEvent;
use super::handler::{Applied, EventHandler};
use super::WatchError;
use crate::config::Config;
use crate::filter::PathFilter;
use crate::store::InventoryStore;

/// Per-worker counters, summed on shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Events that changed or confirmed a record
    pub applied: usize,
    /// Events with nothing to do
    pub ignored: usize,
    /// Events dropped after a store error
    pub dropped: usize,
}

impl WorkerStats {
    fn merge(&mut self, other: Self) {
        self.applied += other.applied;
        self.ignored += other.ignored;
        self.dropped += other.dropped;
    }
}

enum Job {
    Apply(WatchEvent),
    /// Apply a move once the partner worker has reached its fence
    Move(WatchEvent, Arc<Barrier>),
    /// Wait out a move applied by another worker
    Fence(Arc<Barrier>),
}

/// Fixed set of worker threads fed through per-worker queues.
pub struct Dispatcher {
    senders: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<WorkerStats>>,
    filter: Arc<PathFilter>,
}

impl Dispatcher {
    /// Open one store connection per worker and start the workers.
    ///
    /// # Errors
    ///
    /// Fails if a store connection can't be opened or a thread can't be spawned.
    pub fn start(config: &Config, filter: Arc<PathFilter>) -> Result<Self, WatchError> {
        let count = config.watch.workers.max(1);
        let mut senders = Vec::with_capacity(count);
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let store = InventoryStore::from_config(&config.database)?;
            let (tx, rx) = mpsc::channel::<Job>();
            let worker_filter = Arc::clone(&filter);
            let move_window = config.watch.move_window_secs;

            let handle = thread::Builder::new()
                .name(format!("voltrack-worker-{index}"))
                .spawn(move || {
                    let handler = EventHandler::new(&store, &worker_filter, move_window);
                    let mut stats = WorkerStats::default();
                    for job in rx {
                        match job {
                            Job::Apply(event) => apply(&handler, &event, &mut stats),
                            Job::Move(event, barrier) => {
                                barrier.wait();
                                apply(&handler, &event, &mut stats);
                                barrier.wait();
                            }
                            Job::Fence(barrier) => {
                                barrier.wait();
                                barrier.wait();
                            }
                        }
                    }
                    stats
                })
                .map_err(|e| WatchError::WorkerFailed(e.to_string()))?;

            senders.push(tx);
            workers.push(handle);
        }

        log::debug!("Started {} watch worker(s)", count);
        Ok(Self {
            senders,
            workers,
            filter,
        })
    }

    fn worker_for(&self, event: &WatchEvent) -> usize {
        event
            .primary_path()
            .map_or(0, |path| self.worker_for_path(path))
    }

    fn worker_for_path(&self, path: &Path) -> usize {
        let mut hasher = DefaultHasher::new();
        self.filter.partition_key(path).hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    fn send(&self, index: usize, job: Job) -> Result<(), WatchError> {
        self.senders[index]
            .send(job)
            .map_err(|_| WatchError::WorkerFailed(format!("worker {index} has exited")))
    }

    /// Queue an event for its worker.
    ///
    /// # Errors
    ///
    /// [`WatchError::WorkerFailed`] if the worker has exited.
    pub fn dispatch(&self, event: WatchEvent) -> Result<(), WatchError> {
        let index = self.worker_for(&event);
        if let WatchEvent::Moved { to, .. } = &event {
            let partner = self.worker_for_path(to);
            if partner != index {
                let barrier = Arc::new(Barrier::new(2));
                self.send(partner, Job::Fence(Arc::clone(&barrier)))?;
                return self.send(index, Job::Move(event, barrier));
            }
        }
        self.send(index, Job::Apply(event))
    }

    /// Close the queues, let workers drain them, and collect their counters.
    pub fn shutdown(self) -> WorkerStats {
        drop(self.senders);
        let mut total = WorkerStats::default();
        for (index, worker) in self.workers.into_iter().enumerate() {
            match worker.join() {
                Ok(stats) => total.merge(stats),
                Err(_) => log::error!("Watch worker {index} panicked"),
            }
        }
        total
    }
}

fn apply(handler: &EventHandler<'_>, event: &WatchEvent, stats: &mut WorkerStats) {
    match handler.apply(event) {
        Ok(Applied::Ignored) => stats.ignored += 1,
        Ok(applied) => {
            log::trace!("{event:?}: {applied:?}");
            stats.applied += 1;
        }
        Err(e) => {
            log::error!("Dropping {event:?}: {e}");
            stats.dropped += 1;
        }
    }
}
