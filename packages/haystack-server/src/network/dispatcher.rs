//! The UDP dispatcher (§4.F): deferred-startup lifecycle around a
//! fixed-size pool of datagram workers.
//!
//! Grounded on the teacher's `NetworkModule` for the `new()` / `start()`
//! / `serve()` split (allocate shared state, bind the socket, then begin
//! serving once the rest of the application has wired everything
//! together) and on its `ShutdownController`/`InFlightGuard` pair for
//! graceful shutdown -- carried over unchanged from `network/shutdown.rs`.
//! The worker loop itself has no teacher analogue (the teacher never ran
//! over a packet socket); it follows §4.F's numbered recipe directly.

use std::future::Future;
use std::sync::Arc;

use haystack_core::{Digest, Logger, Record, DIGEST_LEN, RECORD_LEN};
use tokio::net::UdpSocket;

use super::config::DispatcherConfig;
use super::shutdown::ShutdownController;
use crate::storage::store::Store;

/// One more than the largest valid datagram (192 bytes), so a `recv_from`
/// that fills the buffer tells us the real datagram was oversize.
const BUFFER_LEN: usize = RECORD_LEN + 1;

/// Owns the UDP socket and the worker pool reading from it.
///
/// Follows the deferred-startup pattern:
/// 1. `new()` -- allocates the shutdown controller and stores the store
///    handle and config.
/// 2. `start()` -- binds the UDP socket to the configured address.
/// 3. `serve()` -- spawns the worker pool and runs until shutdown.
pub struct UdpDispatcher {
    config: DispatcherConfig,
    socket: Option<Arc<UdpSocket>>,
    store: Arc<dyn Store>,
    logger: Arc<dyn Logger>,
    shutdown: Arc<ShutdownController>,
}

impl UdpDispatcher {
    /// Creates a dispatcher without binding any socket.
    #[must_use]
    pub fn new(config: DispatcherConfig, store: Arc<dyn Store>, logger: Arc<dyn Logger>) -> Self {
        Self {
            config,
            socket: None,
            store,
            logger,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// A shared reference to the shutdown controller, for the CLI layer
    /// to wire up a signal handler.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the UDP socket to the configured host and port, returning
    /// the actual bound port (useful when port `0` requests an
    /// OS-assigned one).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket = UdpSocket::bind(&addr).await?;
        let port = socket.local_addr()?.port();
        haystack_core::log_info!(self.logger, "UDP socket bound to {}:{port}", self.config.host);
        self.socket = Some(Arc::new(socket));
        Ok(port)
    }

    /// Spawns the worker pool and serves datagrams until `external_shutdown`
    /// resolves, then drains in-flight work and closes the store.
    ///
    /// # Errors
    ///
    /// Returns an error if `store.close()` fails, or if draining exceeds
    /// the configured grace period.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        external_shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let socket = self.socket.clone().expect("start() must be called before serve()");
        let store = self.store;
        let logger = self.logger;
        let shutdown = self.shutdown;

        let mut workers = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let socket = Arc::clone(&socket);
            let store = Arc::clone(&store);
            let logger = Arc::clone(&logger);
            let mut shutdown_rx = shutdown.shutdown_receiver();
            let shutdown_for_guard = Arc::clone(&shutdown);

            workers.push(tokio::spawn(async move {
                let mut buf = [0u8; BUFFER_LEN];
                loop {
                    let received = tokio::select! {
                        biased;
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                            continue;
                        }
                        received = socket.recv_from(&mut buf) => received,
                    };

                    let (len, src) = match received {
                        Ok(pair) => pair,
                        Err(err) => {
                            haystack_core::log_error!(logger, "worker {worker_id}: recv_from failed: {err}");
                            continue;
                        }
                    };

                    let _guard = shutdown_for_guard.in_flight_guard();
                    handle_datagram(&socket, &store, &logger, &buf[..len], src).await;
                }
            }));
        }

        external_shutdown.await;
        shutdown.trigger_shutdown();

        for worker in workers {
            let _ = worker.await;
        }

        let drained = shutdown
            .wait_for_drain(self.config.shutdown_grace)
            .await;
        if !drained {
            anyhow::bail!("graceful shutdown exceeded the {:?} grace period", self.config.shutdown_grace);
        }

        store.close().await?;
        Ok(())
    }
}

/// Classifies and handles a single datagram per §4.F. Every failure path
/// is a silent drop or a log line -- the dispatcher never replies to a
/// malformed or rejected datagram.
async fn handle_datagram(
    socket: &UdpSocket,
    store: &Arc<dyn Store>,
    logger: &Arc<dyn Logger>,
    datagram: &[u8],
    src: std::net::SocketAddr,
) {
    match datagram.len() {
        DIGEST_LEN => {
            let mut bytes = [0u8; DIGEST_LEN];
            bytes.copy_from_slice(datagram);
            let digest = Digest::from_bytes(bytes);
            match store.get(&digest).await {
                Ok(record) => {
                    if let Err(err) = socket.send_to(&record.as_bytes(), src).await {
                        haystack_core::log_error!(logger, "send_to {src} failed: {err}");
                    }
                }
                Err(_) => {
                    // NotFound or any other read failure: no response.
                }
            }
        }
        RECORD_LEN => match Record::from_bytes(datagram) {
            Ok(record) => {
                if let Err(err) = store.set(record).await {
                    haystack_core::log_error!(logger, "set from {src} failed: {err}");
                }
            }
            Err(_) => {
                // Invalid length or digest mismatch: drop silently.
            }
        },
        other => {
            haystack_core::log_debug!(logger, "invalid length {other} from {src}");
        }
    }
}
