//! Error types for opsmith-monitor

use thiserror::Error;

use opsmith_host::error::HostError;

/// Errors from monitor runs
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The monitor was run without any configured tests
    #[error("no tests configured")]
    NoTests,

    /// The configuration could not be parsed
    #[error("invalid monitor configuration: {0}")]
    Config(String),

    /// A worker task failed
    #[error("monitor worker failed: {0}")]
    Worker(String),

    /// Error from the host facade
    #[error(transparent)]
    Host(#[from] HostError),
}
