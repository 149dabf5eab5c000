//! Protocol constants and per-run transfer options.

/// Unit of every streaming read and write, and of resume granularity.
/// The final chunk of a file may be short; a zero-length chunk is never sent.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Length of the per-connection authentication nonce: ASCII decimal digits,
/// sent as the first bytes on every data channel.
pub const NONCE_SIZE: usize = 32;

/// Name of the server's durable transaction log, relative to its root
/// directory (the invoking user's home).
pub const TRANSACTION_LOG_FILENAME: &str = ".ferry-transactions.json";

/// Default number of files transferred concurrently.
pub const DEFAULT_PARALLELISM: usize = 3;

/// Resolve the worker-pool size: `FERRY_PARALLELISM` env override, else the
/// built-in default.
pub fn default_parallelism() -> usize {
    std::env::var("FERRY_PARALLELISM")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_PARALLELISM)
}

/// Per-run settings carried from the CLI into the transfer driver.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Source is a directory; every reachable file becomes a job.
    pub recursive: bool,
    /// Data channels use plain TCP instead of the reliable-datagram layer.
    pub tcp_mode: bool,
    /// Compare full-file hashes after each transfer.
    pub verify: bool,
    /// Follow symbolic links while walking a recursive source.
    pub follow_links: bool,
    /// Apply source permissions and timestamps on the server after transfer.
    pub copy_status: bool,
    /// Worker-pool size.
    pub parallelism: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            recursive: false,
            tcp_mode: true,
            verify: true,
            follow_links: false,
            copy_status: false,
            parallelism: default_parallelism(),
        }
    }
}
