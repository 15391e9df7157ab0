//! Configuration for the UDP dispatcher (§4.F).

use std::time::Duration;

/// Bind address and worker-pool sizing for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Host to bind the UDP socket to.
    pub host: String,
    /// Port to bind. `0` means OS-assigned.
    pub port: u16,
    /// Number of worker tasks reading from the socket concurrently.
    /// Defaults to the number of available hardware threads (§4.F).
    pub worker_count: usize,
    /// How long `serve` waits for in-flight datagrams to finish and
    /// `store.close()` to return before treating shutdown as failed.
    pub shutdown_grace: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            worker_count: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
