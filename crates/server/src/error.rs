//! Server error types

use std::io;

use thiserror::Error;

/// Server-specific errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not bind
    #[error("failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Listener failed while serving
    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    /// Archive directory could not be prepared
    #[error("failed to open archive at '{path}': {source}")]
    Archive {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Contract-level error (connection limit, validation)
    #[error(transparent)]
    Contract(#[from] contracts::ContractError),

    /// Session join failed
    #[error(transparent)]
    Session(#[from] session::SessionError),
}

impl ServerError {
    pub fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}
