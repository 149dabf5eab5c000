//! Transfer driver — enumerates jobs and runs them on a bounded worker pool.
//!
//! The driver owns the run: it walks the source, pre-creates every
//! destination directory shallowest-first so receivers never race on a
//! parent, then feeds jobs to `parallelism` workers over a shared queue.
//! A failed job is recorded and its siblings continue.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

use ferry_core::config::TransferOptions;
use ferry_core::error::TransferError;

use crate::control::ControlClient;
use crate::progress::ProgressCounters;
use crate::sender::{self, JobStatus, SenderContext};

/// One (source, destination) pair; consumed exactly once by a worker.
#[derive(Debug, Clone)]
struct Job {
    src: PathBuf,
    dest: String,
    size: u64,
}

pub struct TransferDriver {
    ctx: Arc<SenderContext>,
    src: PathBuf,
    dest: String,
    total_jobs: AtomicU64,
    enumerated: AtomicBool,
    failed_jobs: Arc<AtomicU64>,
}

impl TransferDriver {
    pub fn new(
        control: ControlClient,
        host: impl Into<String>,
        src: impl Into<PathBuf>,
        dest: impl Into<String>,
        options: TransferOptions,
    ) -> Self {
        Self {
            ctx: Arc::new(SenderContext {
                control,
                host: host.into(),
                options,
                counters: Arc::new(ProgressCounters::default()),
                live_receivers: Arc::new(DashMap::new()),
            }),
            src: src.into(),
            dest: dest.into(),
            total_jobs: AtomicU64::new(0),
            enumerated: AtomicBool::new(false),
            failed_jobs: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enumerate the source, pre-create destination directories, and launch
    /// the worker pool. Returns promptly with the pool's join handle;
    /// configuration problems fail here, per-job problems never do.
    pub async fn start(&self) -> Result<JoinHandle<()>, TransferError> {
        let jobs = self.enumerate().await?;
        self.ctx.counters.add_enumerated(jobs.len() as u64);
        for job in &jobs {
            self.ctx.counters.add_expected(job.size);
        }
        self.total_jobs.store(jobs.len() as u64, Ordering::Release);
        self.enumerated.store(true, Ordering::Release);
        tracing::debug!(
            jobs = jobs.len(),
            bytes = self.ctx.counters.bytes_expected(),
            "enumeration complete"
        );

        let (tx, rx) = async_channel::bounded(jobs.len().max(1));
        for job in jobs {
            tx.send(job).await.expect("job queue open");
        }
        drop(tx);

        let parallelism = self.ctx.options.parallelism.max(1);
        let ctx = self.ctx.clone();
        let failed = self.failed_jobs.clone();
        Ok(tokio::spawn(async move {
            let mut workers = Vec::with_capacity(parallelism);
            for worker_id in 0..parallelism {
                workers.push(tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    ctx.clone(),
                    failed.clone(),
                )));
            }
            for worker in workers {
                let _ = worker.await;
            }
        }))
    }

    /// True iff every enumerated job has reached a terminal state.
    pub fn is_transfer_finished(&self) -> bool {
        self.enumerated.load(Ordering::Acquire)
            && self.ctx.counters.files_processed() == self.total_jobs.load(Ordering::Acquire)
    }

    /// True iff the run is finished and no job failed.
    pub fn is_transfer_success(&self) -> bool {
        self.is_transfer_finished() && self.failed_jobs.load(Ordering::Acquire) == 0
    }

    pub fn files_processed(&self) -> u64 {
        self.ctx.counters.files_processed()
    }

    pub fn files_transferred(&self) -> u64 {
        self.ctx.counters.files_transferred()
    }

    /// Sum of all source sizes.
    pub fn transfer_size(&self) -> u64 {
        self.ctx.counters.bytes_expected()
    }

    /// Bytes committed on the server, summed across receivers.
    pub fn server_received_size(&self) -> u64 {
        self.ctx.counters.bytes_acked()
    }

    pub fn counters(&self) -> Arc<ProgressCounters> {
        self.ctx.counters.clone()
    }

    /// Best-effort release of any receivers still live on the server.
    pub async fn close(&self) {
        let ids: Vec<u64> = self.ctx.live_receivers.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.ctx.control.close_receiver(id).await.ok();
        }
    }

    async fn enumerate(&self) -> Result<Vec<Job>, TransferError> {
        if !self.ctx.options.recursive {
            if self.src.is_dir() {
                return Err(TransferError::Config(format!(
                    "{} is a directory (use --recursive)",
                    self.src.display()
                )));
            }
            if !self.src.is_file() {
                return Err(TransferError::Config(format!(
                    "source file not found: {}",
                    self.src.display()
                )));
            }
            let size = std::fs::metadata(&self.src)?.len();
            return Ok(vec![Job {
                src: self.src.clone(),
                dest: self.dest.clone(),
                size,
            }]);
        }

        if self.src.is_file() {
            return Err(TransferError::Config(format!(
                "{} is a file (drop --recursive)",
                self.src.display()
            )));
        }
        if !self.src.is_dir() {
            return Err(TransferError::Config(format!(
                "source directory not found: {}",
                self.src.display()
            )));
        }

        self.ctx.control.create_dir(&self.dest).await?;

        let mut jobs = Vec::new();
        for entry in WalkDir::new(&self.src).follow_links(self.ctx.options.follow_links) {
            let entry = entry.map_err(|e| TransferError::Io(std::io::Error::other(e)))?;
            let rel = entry
                .path()
                .strip_prefix(&self.src)
                .expect("walk stays under the source");
            if rel.as_os_str().is_empty() {
                continue;
            }
            let dest = join_dest(&self.dest, &rel.to_string_lossy());
            if entry.file_type().is_dir() {
                // Parents precede children in walk order, so each mkdir's
                // parent already exists on the server.
                self.ctx.control.create_dir(&dest).await?;
            } else if entry.file_type().is_file() {
                let size = entry
                    .metadata()
                    .map_err(|e| TransferError::Io(std::io::Error::other(e)))?
                    .len();
                jobs.push(Job {
                    src: entry.path().to_path_buf(),
                    dest,
                    size,
                });
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping non-regular file");
            }
        }
        Ok(jobs)
    }
}

fn join_dest(dest_root: &str, rel: &str) -> String {
    format!("{}/{}", dest_root.trim_end_matches('/'), rel)
}

async fn worker_loop(
    worker_id: usize,
    rx: async_channel::Receiver<Job>,
    ctx: Arc<SenderContext>,
    failed: Arc<AtomicU64>,
) {
    while let Ok(job) = rx.recv().await {
        tracing::debug!(worker_id, src = %job.src.display(), dest = %job.dest, "job started");
        match sender::send_file(&ctx, &job.src, &job.dest).await {
            Ok(JobStatus::Transferred) => {
                ctx.counters.add_transferred();
                tracing::info!(src = %job.src.display(), bytes = job.size, "transferred");
            }
            Ok(JobStatus::Skipped) => {
                ctx.counters.add_transferred();
                tracing::info!(src = %job.src.display(), "already present, skipped");
            }
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(src = %job.src.display(), error = %e, "transfer failed");
            }
        }
        ctx.counters.add_processed();
    }
}
