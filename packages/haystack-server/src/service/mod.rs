//! Shared background-task infrastructure used by the storage layer.

pub mod worker;

pub use worker::BackgroundWorker;
