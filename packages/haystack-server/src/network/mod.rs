//! The UDP dispatcher and its shutdown machinery.

pub mod config;
pub mod dispatcher;
pub mod shutdown;

pub use config::DispatcherConfig;
pub use dispatcher::UdpDispatcher;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
