//! Transfer error kinds.
//!
//! Per-job errors are captured in the job's terminal state and aggregated by
//! the driver; only configuration and control-channel establishment errors
//! abort a whole run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Bad CLI arguments or a source/flag mismatch. Fatal at driver start.
    #[error("{0}")]
    Config(String),

    /// Control- or data-channel establishment failure.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The receiver rejected the data-channel nonce.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Read/write/seek failure on either side.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unexpected RPC response shape, or a receiver that refused to start.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Post-transfer hash mismatch. The file is left in place on the server;
    /// the next run will detect the mismatch and overwrite.
    #[error("verification failed for {path}: local {local}, server {remote}")]
    Verify {
        path: String,
        local: String,
        remote: String,
    },
}

pub type Result<T> = std::result::Result<T, TransferError>;
