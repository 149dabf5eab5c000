//! Per-file sender — resume negotiation, nonce exchange, chunk streaming.
//!
//! Each job runs this exactly once: decide fresh/resume/skip against the
//! server's copy, then open a receiver, authenticate a data channel, and
//! stream from the resume offset to end of file.

use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::timeout;

use ferry_core::config::{TransferOptions, CHUNK_SIZE};
use ferry_core::error::TransferError;
use ferry_core::hash;
use ferry_core::proto::{OpenReceiverResponse, ReceiverState, StartReceiveRequest, StatusRequest};
use ferry_core::stream::ChunkedStream;

use crate::control::ControlClient;
use crate::progress::{AckedTracker, ProgressCounters};

/// How often a live receiver is polled for committed bytes.
const ACK_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for the receiver to finalize after the last byte.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a worker needs to run jobs; shared across the pool.
pub struct SenderContext {
    pub control: ControlClient,
    /// Host the data channels dial (the server machine, not the tunnel).
    pub host: String,
    pub options: TransferOptions,
    pub counters: Arc<ProgressCounters>,
    /// Receiver ids with an in-flight transfer, for best-effort release.
    pub live_receivers: Arc<DashMap<u64, ()>>,
}

/// Successful terminal states of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Transferred,
    Skipped,
}

/// Outcome of resume negotiation. Derived once per job, never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    /// Server copy is absent, empty, or incompatible: start from byte 0.
    Fresh,
    /// Server holds a matching prefix of `blocks` whole chunks.
    Resume { blocks: u64 },
    /// Server copy already equals the source.
    Skip,
}

impl ResumeDecision {
    fn blocks(self) -> u64 {
        match self {
            ResumeDecision::Resume { blocks } => blocks,
            _ => 0,
        }
    }
}

/// Compare the server's copy against the source and pick a transfer mode.
///
/// A server file larger than the source is treated as a mismatch outright;
/// appending can never reconcile it, whatever its leading blocks contain.
pub async fn negotiate(
    control: &ControlClient,
    src: &Path,
    server_path: &str,
    local_size: u64,
) -> Result<ResumeDecision, TransferError> {
    let server_size = control.probe_file(server_path).await?;
    if server_size == 0 {
        control.overwrite_file(server_path).await?;
        return Ok(ResumeDecision::Fresh);
    }
    if server_size > local_size {
        // A longer server copy can never become the source by appending,
        // even when its leading blocks hash identically.
        tracing::debug!(server_path, server_size, local_size, "server copy larger, overwriting");
        control.overwrite_file(server_path).await?;
        return Ok(ResumeDecision::Fresh);
    }

    let blocks = if server_size != local_size {
        control.block_count(server_path).await?
    } else {
        0
    };

    let server_hash = control.partial_hash(server_path, blocks).await?;
    let local_hash = local_partial_hash(src, blocks).await?;

    if local_hash != server_hash {
        tracing::debug!(server_path, blocks, "partial hashes differ, overwriting");
        control.overwrite_file(server_path).await?;
        Ok(ResumeDecision::Fresh)
    } else if blocks == 0 {
        Ok(ResumeDecision::Skip)
    } else {
        Ok(ResumeDecision::Resume { blocks })
    }
}

/// Run one job to a terminal state.
pub async fn send_file(
    ctx: &SenderContext,
    src: &Path,
    dest: &str,
) -> Result<JobStatus, TransferError> {
    let validated = ctx
        .control
        .validate_path(dest, &src.to_string_lossy(), true)
        .await?;
    if !validated.ok {
        let reason = validated.message.unwrap_or_else(|| "invalid destination".into());
        return Err(TransferError::Protocol(reason));
    }
    let server_path = validated
        .resolved
        .ok_or_else(|| TransferError::Protocol("validate returned no path".into()))?;
    tracing::debug!(src = %src.display(), %server_path, "destination resolved");

    let local_size = std::fs::metadata(src)?.len();
    let decision = negotiate(&ctx.control, src, &server_path, local_size).await?;
    if decision == ResumeDecision::Skip {
        tracing::debug!(src = %src.display(), "file already transferred, skipping");
        return Ok(JobStatus::Skipped);
    }
    let blocks = decision.blocks();

    // Full-content hash: keys the server's transaction log and doubles as
    // the local side of post-transfer verification.
    let source_hash = local_partial_hash(src, 0).await?;

    let open = ctx.control.open_receiver(ctx.options.tcp_mode).await?;
    ctx.live_receivers.insert(open.receiver_id, ());
    let result = run_transfer(ctx, src, &server_path, blocks, local_size, &source_hash, &open).await;
    ctx.live_receivers.remove(&open.receiver_id);
    ctx.control.close_receiver(open.receiver_id).await.ok();
    result?;

    if ctx.options.verify {
        let server_hash = ctx.control.partial_hash(&server_path, 0).await?;
        if server_hash != source_hash {
            return Err(TransferError::Verify {
                path: server_path,
                local: source_hash,
                remote: server_hash,
            });
        }
        tracing::debug!(%server_path, "verification passed");
    }

    if ctx.options.copy_status {
        let status = local_status(src, &server_path)?;
        ctx.control.apply_status(&status).await?;
    }

    Ok(JobStatus::Transferred)
}

async fn run_transfer(
    ctx: &SenderContext,
    src: &Path,
    server_path: &str,
    blocks: u64,
    local_size: u64,
    source_hash: &str,
    open: &OpenReceiverResponse,
) -> Result<(), TransferError> {
    ctx.control
        .start_receive(
            open.receiver_id,
            &StartReceiveRequest {
                path: server_path.to_string(),
                blocks,
                file_size: local_size,
                source_hash: source_hash.to_string(),
            },
        )
        .await?;

    let mut stream = ChunkedStream::connect(&ctx.host, open.port, ctx.options.tcp_mode).await?;

    // The nonce happens-before any payload byte.
    stream.send_all(open.nonce.as_bytes()).await?;

    let tracker = Arc::new(AckedTracker::default());
    let poller = tokio::spawn(poll_acked(
        ctx.control.clone(),
        open.receiver_id,
        ctx.counters.clone(),
        tracker.clone(),
    ));

    let streamed = stream_chunks(src, blocks, &mut stream).await;
    poller.abort();
    streamed?;

    // The receiver usually terminates on its own at file_size; the close
    // covers the end-of-stream path and is best-effort past that.
    stream.close().await.ok();

    let finalized = wait_receiver_done(ctx, open.receiver_id, &tracker).await;
    // Whatever the outcome, the acked total ends exact for a finished job.
    tracker.update(&ctx.counters, local_size);
    finalized
}

/// Seek to the resume offset and push CHUNK_SIZE-sized reads until the file
/// is exhausted. A source that ends exactly on a chunk boundary produces a
/// final zero-length read, which is never sent.
async fn stream_chunks(
    src: &Path,
    blocks: u64,
    stream: &mut ChunkedStream,
) -> Result<(), TransferError> {
    let offset = blocks * CHUNK_SIZE as u64;
    let mut file = tokio::fs::File::open(src).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let filled = read_chunk(&mut file, &mut buf).await?;
        if filled == 0 {
            break;
        }
        stream.send_all(&buf[..filled]).await?;
        sent += filled as u64;
    }
    tracing::debug!(src = %src.display(), offset, sent, "data sent");
    Ok(())
}

/// Fill `buf` from an async reader, tolerating short reads.
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Poll until the receiver reaches a terminal state, feeding acked bytes
/// into the counters along the way.
async fn wait_receiver_done(
    ctx: &SenderContext,
    receiver_id: u64,
    tracker: &AckedTracker,
) -> Result<(), TransferError> {
    let wait = async {
        loop {
            let status = ctx.control.receiver_status(receiver_id).await?;
            tracker.update(&ctx.counters, status.bytes);
            match status.state {
                ReceiverState::Done => return Ok(()),
                ReceiverState::Failed => {
                    return Err(TransferError::Protocol(
                        "receiver failed before finalizing".into(),
                    ))
                }
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    };
    timeout(FINALIZE_TIMEOUT, wait)
        .await
        .map_err(|_| TransferError::Protocol("receiver did not finalize in time".into()))?
}

async fn poll_acked(
    control: ControlClient,
    receiver_id: u64,
    counters: Arc<ProgressCounters>,
    tracker: Arc<AckedTracker>,
) {
    let mut interval = tokio::time::interval(ACK_POLL_INTERVAL);
    loop {
        interval.tick().await;
        match control.receiver_status(receiver_id).await {
            Ok(status) => tracker.update(&counters, status.bytes),
            Err(_) => break,
        }
    }
}

/// Local partial hash on the blocking pool; hashing a large source would
/// otherwise stall the worker's reactor thread.
async fn local_partial_hash(src: &Path, blocks: u64) -> Result<String, TransferError> {
    let path = src.to_path_buf();
    tokio::task::spawn_blocking(move || hash::partial_hash(&path, blocks))
        .await
        .map_err(|e| TransferError::Protocol(format!("hash task: {e}")))?
        .map_err(TransferError::Io)
}

/// Snapshot the source's permissions and timestamps for the server.
fn local_status(src: &Path, server_path: &str) -> Result<StatusRequest, TransferError> {
    let meta = std::fs::metadata(src)?;

    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode()
    };
    #[cfg(not(unix))]
    let mode = 0o644;

    let (mtime_secs, mtime_nanos) = unix_time(meta.modified()?);
    let (atime_secs, atime_nanos) = unix_time(meta.accessed()?);

    Ok(StatusRequest {
        path: server_path.to_string(),
        mode,
        mtime_secs,
        mtime_nanos,
        atime_secs,
        atime_nanos,
    })
}

fn unix_time(t: SystemTime) -> (i64, u32) {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => (-(e.duration().as_secs() as i64), 0),
    }
}
