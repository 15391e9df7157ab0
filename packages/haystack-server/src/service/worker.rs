//! A generic periodic background task, used by the in-memory store's
//! evictor (§4.B) and the persistent store's compactor (§4.E).
//!
//! Both of those are "tick every interval, do some bounded amount of
//! work, stop cooperatively on shutdown" -- exactly the same shape, so
//! they share this one implementation instead of hand-rolling a
//! `tokio::spawn` + `watch` pair twice.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A periodic task spawned onto the Tokio runtime, cancellable and
/// joinable.
///
/// `spawn` takes an async closure invoked once per tick; the closure
/// itself decides how much work to do per tick (the evictor drains one
/// expiration event, the compactor checks stats and maybe compacts).
/// Shutdown is cooperative: `shutdown()` signals a `watch` channel and
/// awaits the task, which checks the channel between ticks.
pub struct BackgroundWorker {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWorker {
    /// Spawns a task that calls `on_tick` once per `interval` until
    /// shutdown is requested. `on_tick` also runs once immediately
    /// before the first sleep, so the first unit of work doesn't wait a
    /// full interval.
    pub fn spawn<F, Fut>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            loop {
                on_tick().await;

                if *shutdown_rx.borrow() {
                    return;
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signals the task to stop and awaits its completion.
    ///
    /// Idempotent: calling this more than once (or after the task has
    /// already exited on its own) is a no-op.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}
