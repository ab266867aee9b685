//! Kernel error hierarchy.
//!
//! Detected invariant violations are not errors: they travel as
//! [`ViolationReport`](crate::violation::ViolationReport) values. Errors here
//! are the few conditions that stop the kernel from being built at all.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The background verification thread could not be started.
    #[error("failed to spawn verification worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

pub type KernelResult<T> = Result<T, KernelError>;
