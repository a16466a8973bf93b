use thiserror::Error;

use crate::{config::ConfigError, rpc};

/// Errors returned while starting the monitor.
///
/// Once running, chain workers never surface errors to the caller: every recoverable condition
/// is logged and retried inside the worker.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rpc(#[from] rpc::Error),

    /// No configured chain could be started.
    #[error("No chain could be started")]
    NoChains,
}
