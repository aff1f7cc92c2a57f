//! Error types for the folder list

use ferrymail_core::CoreError;
use thiserror::Error;

/// Why a refresh did not go through
#[derive(Debug, Error)]
pub enum RefreshError {
    /// A sync had to reach the network and it was not reachable
    #[error("No internet connection")]
    NoInternet,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Failure of a background task
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The work itself returned an error
    #[error("{0}")]
    Failed(E),

    #[error("Task {0} panicked")]
    Panicked(&'static str),

    #[error("Task {0} was cancelled")]
    Cancelled(&'static str),
}
