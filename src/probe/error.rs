//! Error types for the probe

use thiserror::Error;

/// Errors raised while building, serving or checking the application
///
/// The engines never retry on these; any probe error is a failed probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Command did not finish within its timeout
    #[error("'{command}' timed out after {secs}s")]
    Timeout {
        /// Command line
        command: String,
        /// Timeout that was exceeded
        secs: u64,
    },

    /// Command could not be started
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        /// Command line
        command: String,
        #[source]
        /// IO error source
        source: std::io::Error,
    },

    /// I/O error while measuring artifacts or waiting on a process
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error on {url}: {reason}")]
    Http {
        /// Requested URL
        url: String,
        /// Client error text
        reason: String,
    },

    /// Something already answers on the serve URL
    #[error("A server is already running at {url}")]
    ServerAlreadyRunning {
        /// Serve URL
        url: String,
    },

    /// Serve process exited before it answered
    #[error("'{command}' exited before serving ({status})")]
    ServerExited {
        /// Command line
        command: String,
        /// Exit status text
        status: String,
    },

    /// Cancelled while waiting on a process
    #[error("Cancelled while running '{command}'")]
    Cancelled {
        /// Command line
        command: String,
    },
}
