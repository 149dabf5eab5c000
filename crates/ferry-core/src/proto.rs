//! Control-channel protocol — request/response bodies for every operation
//! the server exposes.
//!
//! These types ARE the control protocol: the client serializes requests with
//! serde_json and the server answers with the matching response body. A
//! receiver opened by one call is referenced by later calls through its
//! integer `receiver_id`.

use serde::{Deserialize, Serialize};

// ── Filesystem operations ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    /// Destination path as given by the user.
    pub dest: String,
    /// Client-side source path; its basename is appended when `dest` is a
    /// directory.
    pub src: String,
    /// Create missing parent directories instead of rejecting the path.
    pub create_parents: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub ok: bool,
    /// Fully-resolved server path when `ok`.
    pub resolved: Option<String>,
    /// Human-readable rejection reason when not `ok`.
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// Size in bytes; 0 when the file did not exist (it exists, empty, once
    /// the probe returns).
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashRequest {
    pub path: String,
    /// Number of chunks to hash; 0 hashes the whole file.
    pub blocks: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashResponse {
    pub digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverwriteRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksResponse {
    /// `floor(size / CHUNK_SIZE)`.
    pub blocks: u64,
}

/// Permissions and timestamps applied to a completed transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    pub path: String,
    /// Unix permission bits.
    pub mode: u32,
    pub mtime_secs: i64,
    pub mtime_nanos: u32,
    pub atime_secs: i64,
    pub atime_nanos: u32,
}

// ── Receiver operations ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenReceiverRequest {
    pub tcp_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenReceiverResponse {
    /// Handle for subsequent start/bytes/close calls.
    pub receiver_id: u64,
    /// Data-channel port the client must connect to.
    pub port: u16,
    /// Nonce the client must echo as the first bytes on the data channel.
    pub nonce: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartReceiveRequest {
    /// Resolved server path to write into.
    pub path: String,
    /// Writing starts at `blocks * CHUNK_SIZE`.
    pub blocks: u64,
    /// Receiving stops once this many bytes exist.
    pub file_size: u64,
    /// Full-content hash of the source; keys the transaction log.
    pub source_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverStatusResponse {
    /// Bytes committed so far, including the resume offset.
    pub bytes: u64,
    pub state: ReceiverState,
}

/// Receiver lifecycle. Terminal states release the data-channel listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverState {
    Listening,
    Authenticating,
    Receiving,
    Done,
    Failed,
}

/// Empty acknowledgement body for operations with no return value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {}
