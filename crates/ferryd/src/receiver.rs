//! Per-file data receiver — nonce check, append loop, log finalize.
//!
//! One instance per in-flight file. Construction binds the data-channel
//! listener and generates the nonce; nothing is accepted until `start`,
//! which returns promptly and leaves the byte-pumping to a spawned task so
//! further control calls proceed concurrently.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rand::Rng;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::task::JoinHandle;

use ferry_core::config::{CHUNK_SIZE, NONCE_SIZE};
use ferry_core::error::TransferError;
use ferry_core::proto::ReceiverState;
use ferry_core::stream::DataListener;

use crate::txlog::{SharedLog, TransactionRecord};

const STATE_LISTENING: u8 = 0;
const STATE_AUTHENTICATING: u8 = 1;
const STATE_RECEIVING: u8 = 2;
const STATE_DONE: u8 = 3;
const STATE_FAILED: u8 = 4;

pub struct FileReceiver {
    port: u16,
    nonce: String,
    bytes: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    listener: Mutex<Option<DataListener>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FileReceiver {
    /// Bind an ephemeral data-channel port and generate the nonce. No data
    /// is accepted until `start`.
    pub async fn open(tcp_mode: bool) -> std::io::Result<Self> {
        let listener = DataListener::bind(tcp_mode).await?;
        let port = listener.local_port()?;
        let nonce = generate_nonce();
        tracing::debug!(port, "receiver listening");
        Ok(Self {
            port,
            nonce,
            bytes: Arc::new(AtomicU64::new(0)),
            state: Arc::new(AtomicU8::new(STATE_LISTENING)),
            listener: Mutex::new(Some(listener)),
            task: Mutex::new(None),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Bytes committed so far, including the resume offset.
    pub fn bytes_received(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ReceiverState {
        match self.state.load(Ordering::Acquire) {
            STATE_LISTENING => ReceiverState::Listening,
            STATE_AUTHENTICATING => ReceiverState::Authenticating,
            STATE_RECEIVING => ReceiverState::Receiving,
            STATE_DONE => ReceiverState::Done,
            _ => ReceiverState::Failed,
        }
    }

    /// Begin receiving `path` at offset `blocks * CHUNK_SIZE`, stopping at
    /// `file_size`. Records the transfer in the transaction log, then spawns
    /// the accept/verify/receive loop.
    pub async fn start(
        &self,
        path: PathBuf,
        blocks: u64,
        file_size: u64,
        source_hash: String,
        log: SharedLog,
    ) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .expect("listener lock")
            .take()
            .context("receiver already started")?;

        let offset = blocks * CHUNK_SIZE as u64;

        {
            let mut log = log.lock().await;
            if log.lookup(&source_hash).is_none() {
                log.insert(
                    &source_hash,
                    TransactionRecord {
                        path: path.to_string_lossy().into_owned(),
                        bytes: offset,
                    },
                )?;
            }
        }

        let nonce = self.nonce.clone();
        let bytes = self.bytes.clone();
        let state = self.state.clone();
        let handle = tokio::spawn(async move {
            let result = run_receive(
                listener,
                nonce,
                path.clone(),
                offset,
                file_size,
                bytes,
                state.clone(),
                log,
                source_hash,
            )
            .await;
            match result {
                Ok(()) => state.store(STATE_DONE, Ordering::Release),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "receive failed");
                    state.store(STATE_FAILED, Ordering::Release);
                }
            }
        });
        *self.task.lock().expect("task lock") = Some(handle);
        Ok(())
    }

    /// Best-effort release: drop an unaccepted listener and abort a live
    /// receive task.
    pub fn close(&self) {
        self.listener.lock().expect("listener lock").take();
        if let Some(task) = self.task.lock().expect("task lock").take() {
            task.abort();
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_receive(
    listener: DataListener,
    expected_nonce: String,
    path: PathBuf,
    offset: u64,
    file_size: u64,
    bytes: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    log: SharedLog,
    source_hash: String,
) -> Result<()> {
    let mut stream = listener.accept().await.context("accept failed")?;
    state.store(STATE_AUTHENTICATING, Ordering::Release);

    // Exactly NONCE_SIZE bytes precede any file byte. Anything else is a
    // fatal connection error and leaves the target untouched.
    let mut nonce_buf = [0u8; NONCE_SIZE];
    let mut filled = 0;
    while filled < NONCE_SIZE {
        let n = stream.recv_into(&mut nonce_buf[filled..]).await?;
        if n == 0 {
            return Err(TransferError::Auth(
                "connection closed during nonce exchange".into(),
            )
            .into());
        }
        filled += n;
    }
    if nonce_buf != expected_nonce.as_bytes() {
        return Err(TransferError::Auth("nonce mismatch, rejecting data channel".into()).into());
    }
    tracing::debug!(path = %path.display(), "nonce verified");

    state.store(STATE_RECEIVING, Ordering::Release);
    let mut file = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)
        .await
        .with_context(|| format!("open {}", path.display()))?;
    file.seek(SeekFrom::Start(offset)).await?;

    let mut size = offset;
    bytes.store(size, Ordering::Release);
    let mut buf = vec![0u8; CHUNK_SIZE];
    while size < file_size {
        let n = stream.recv_into(&mut buf).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        size += n as u64;
        bytes.store(size, Ordering::Release);
    }
    file.flush().await?;
    drop(file);

    let mut log = log.lock().await;
    if size == file_size {
        log.remove(&source_hash)?;
        tracing::info!(path = %path.display(), size, "file received");
    } else {
        log.insert(
            &source_hash,
            TransactionRecord {
                path: path.to_string_lossy().into_owned(),
                bytes: size,
            },
        )?;
        tracing::info!(path = %path.display(), size, file_size, "partial receipt recorded");
    }
    Ok(())
}

/// `NONCE_SIZE` random ASCII decimal digits.
fn generate_nonce() -> String {
    let mut rng = rand::thread_rng();
    (0..NONCE_SIZE)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}
