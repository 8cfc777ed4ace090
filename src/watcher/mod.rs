//! Watcher: keeps the store current between scans.
//!
//! One recursive `notify` subscription per volume root feeds a single
//! channel. The loop translates each raw event into [`WatchEvent`]s, drops
//! what the [`PathFilter`] does not admit, and hands the rest to the
//! [`Dispatcher`]. A dropped kernel queue (overflow) or a dead subscription
//! ends the run with an error; the next full scan repairs whatever was missed.

pub mod dispatch;
pub mod events;
pub mod handler;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher as _};
use thiserror::Error;

pub use dispatch::{Dispatcher, WorkerStats};
pub use events::WatchEvent;
pub use handler::{Applied, EventHandler};

use crate::config::Config;
use crate::filter::PathFilter;
use crate::store::StoreError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors that end a watch run.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The notification backend failed
    #[error("Filesystem notification error: {0}")]
    Notify(#[from] notify::Error),

    /// Could not subscribe to a volume root
    #[error("Cannot watch {path}: {source}")]
    Subscribe {
        /// Volume root
        path: PathBuf,
        /// Backend error
        #[source]
        source: notify::Error,
    },

    /// Events were lost; the inventory may have missed changes
    #[error("Event queue overflowed; run a full scan to resynchronize")]
    Overflow,

    /// The event channel closed while the watcher was still running
    #[error("Event channel disconnected")]
    Disconnected,

    /// A worker could not open its store connection
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A worker thread could not be started or has exited
    #[error("Watch worker failed: {0}")]
    WorkerFailed(String),
}

/// Counters from one watch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Raw notifications received
    pub notifications: usize,
    /// Translated events handed to workers
    pub dispatched: usize,
    /// Translated events outside the filter
    pub filtered: usize,
    /// Worker counters
    pub workers: WorkerStats,
}

/// Whether a backend error means the subscription is gone.
fn is_fatal(err: &notify::Error) -> bool {
    matches!(
        err.kind,
        notify::ErrorKind::Io(_) | notify::ErrorKind::MaxFilesWatch
    )
}

/// Long-running watch over every configured volume.
pub struct Watcher {
    config: Config,
    filter: Arc<PathFilter>,
    shutdown_flag: Arc<AtomicBool>,
}

impl Watcher {
    /// Create a watcher that runs until `shutdown_flag` is set.
    #[must_use]
    pub fn new(config: &Config, shutdown_flag: Arc<AtomicBool>) -> Self {
        Self {
            config: config.clone(),
            filter: Arc::new(config.path_filter()),
            shutdown_flag,
        }
    }

    /// Subscribe and apply events until shutdown.
    ///
    /// Workers drain their queues before this returns, also on error.
    ///
    /// # Errors
    ///
    /// [`WatchError`] when the subscription can't be set up or dies.
    pub fn run(&self) -> Result<WatchStats, WatchError> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        })?;

        for volume in self.filter.volumes() {
            watcher
                .watch(volume, RecursiveMode::Recursive)
                .map_err(|source| WatchError::Subscribe {
                    path: volume.clone(),
                    source,
                })?;
            log::info!("Watching {}", volume.display());
        }

        let dispatcher = Dispatcher::start(&self.config, Arc::clone(&self.filter))?;
        let mut stats = WatchStats::default();
        let result = self.event_loop(&rx, &dispatcher, &mut stats);

        drop(watcher);
        stats.workers = dispatcher.shutdown();
        log::info!(
            "Watcher stopped: {} notifications, {} events applied, {} ignored, {} dropped",
            stats.notifications,
            stats.workers.applied,
            stats.workers.ignored,
            stats.workers.dropped
        );
        result.map(|()| stats)
    }

    fn event_loop(
        &self,
        rx: &mpsc::Receiver<notify::Result<notify::Event>>,
        dispatcher: &Dispatcher,
        stats: &mut WatchStats,
    ) -> Result<(), WatchError> {
        while !self.shutdown_flag.load(Ordering::SeqCst) {
            let event = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(event)) => event,
                Ok(Err(e)) if is_fatal(&e) => return Err(WatchError::Notify(e)),
                Ok(Err(e)) => {
                    log::warn!("Watch error: {e}");
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(WatchError::Disconnected),
            };

            stats.notifications += 1;
            log::trace!("notify: {:?} {:?}", event.kind, event.paths);
            for translated in WatchEvent::from_notify(&event) {
                match translated.filtered(&self.filter) {
                    Some(WatchEvent::Overflow) => return Err(WatchError::Overflow),
                    Some(admitted) => {
                        log::debug!("{admitted:?}");
                        dispatcher.dispatch(admitted)?;
                        stats.dispatched += 1;
                    }
                    None => stats.filtered += 1,
                }
            }
        }
        log::info!("Shutdown requested, stopping watcher");
        Ok(())
    }
}
