//! Ferry integration test harness.
//!
//! Each test spawns a real ferryd control service in-process on a loopback
//! port, rooted in its own temp directory, and drives real transfers with
//! the client's driver. Nothing here is mocked: data channels, receivers,
//! the transaction log, and verification all run end to end.

mod auth;
mod resume;
mod transfer;

use std::path::{Path, PathBuf};

use ferry::{ControlClient, TransferDriver};
use ferry_core::config::{TransferOptions, TRANSACTION_LOG_FILENAME};
use ferryd::api::{self, AppState};

// ── Server harness ────────────────────────────────────────────────────────────

pub struct TestServer {
    pub root: tempfile::TempDir,
    pub state: AppState,
    pub port: u16,
    task: tokio::task::JoinHandle<()>,
}

pub async fn spawn_server() -> TestServer {
    spawn_server_at(tempfile::tempdir().expect("tempdir")).await
}

/// Spawn a server rooted at an existing directory; used to simulate a
/// server restart over the same state.
pub async fn spawn_server_at(root: tempfile::TempDir) -> TestServer {
    let state = AppState::new(root.path().to_path_buf());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind control port");
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn({
        let state = state.clone();
        async move {
            api::serve(listener, state).await.ok();
        }
    });
    TestServer {
        root,
        state,
        port,
        task,
    }
}

impl TestServer {
    pub fn control(&self) -> ControlClient {
        ControlClient::new("127.0.0.1", self.port)
    }

    pub fn driver(&self, src: &Path, dest: &str, options: TransferOptions) -> TransferDriver {
        TransferDriver::new(self.control(), "127.0.0.1", src, dest, options)
    }

    /// A path under the server's root.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.path().join(rel)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path(TRANSACTION_LOG_FILENAME)
    }

    /// Stop the control service, keeping the root for a later restart.
    pub fn shutdown(self) -> tempfile::TempDir {
        self.task.abort();
        self.root
    }
}

// ── Transfer helpers ──────────────────────────────────────────────────────────

/// Run a whole transfer to completion; returns overall success.
pub async fn run_transfer(
    server: &TestServer,
    src: &Path,
    dest: &str,
    options: TransferOptions,
) -> bool {
    let driver = server.driver(src, dest, options);
    let pool = driver.start().await.expect("driver start");
    pool.await.expect("worker pool");
    driver.close().await;
    assert!(driver.is_transfer_finished(), "all jobs must be terminal");
    driver.is_transfer_success()
}

pub fn options() -> TransferOptions {
    TransferOptions {
        recursive: false,
        tcp_mode: true,
        verify: true,
        follow_links: false,
        copy_status: false,
        parallelism: 3,
    }
}

/// Deterministic non-repeating byte pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn write_file(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}
