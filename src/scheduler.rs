//! Merge Scheduler
//!
//! Background thread that calls `Engine::try_merge` on a fixed interval.
//! The engine itself knows nothing about scheduling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, select, Sender};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::Result;

/// Handle to a running merge scheduler
///
/// Dropping the handle stops the thread and waits for an in-flight merge.
pub struct MergeScheduler {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    /// Ticks that reached `try_merge`
    runs: Arc<AtomicU64>,
}

impl MergeScheduler {
    /// Spawn the scheduler thread on the engine's configured `merge_interval`
    pub fn for_engine(engine: Arc<Engine>) -> Result<Self> {
        let interval = engine.config().merge_interval;
        Self::start(engine, interval)
    }

    /// Spawn the scheduler thread with an explicit interval
    pub fn start(engine: Arc<Engine>, interval: Duration) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(interval);
        let runs = Arc::new(AtomicU64::new(0));
        let thread_runs = Arc::clone(&runs);

        let handle = thread::Builder::new()
            .name("caskkv-merge".to_string())
            .spawn(move || {
                info!(interval_ms = interval.as_millis() as u64, "merge scheduler started");
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            run_once(&engine);
                            thread_runs.fetch_add(1, Ordering::Relaxed);
                        }
                        // Fires on an explicit stop and when the handle is dropped
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                info!("merge scheduler stopped");
            })?;

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
            runs,
        })
    }

    /// Number of merge attempts made so far
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("merge scheduler thread panicked");
            }
        }
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// One scheduled attempt; errors are logged and retried next tick
fn run_once(engine: &Engine) {
    match engine.try_merge() {
        Ok(stats) if stats.is_completed() => info!(
            merged = stats.segments_merged,
            reclaimed = stats.bytes_reclaimed(),
            "scheduled merge finished"
        ),
        Ok(stats) => debug!(outcome = ?stats.outcome, "scheduled merge skipped"),
        Err(e) => warn!(error = %e, "scheduled merge failed"),
    }
}
