//! End-to-end transfer scenarios: fresh files, chunk-boundary sources,
//! overwrite on mismatch, idempotent skip, recursive trees, parallelism.

use crate::*;
use ferry_core::config::CHUNK_SIZE;

#[tokio::test]
async fn small_fresh_file() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    write_file(&src, &[0x41u8; 100]);

    assert!(run_transfer(&server, &src, "dest.bin", options()).await);

    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), vec![0x41u8; 100]);
    // A completed transfer leaves no transaction behind.
    assert!(server.state.log.lock().await.is_empty());
    assert!(server.state.receivers.is_empty());
}

#[tokio::test]
async fn source_an_exact_multiple_of_the_chunk_size() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(3 * CHUNK_SIZE);
    write_file(&src, &data);

    assert!(run_transfer(&server, &src, "dest.bin", options()).await);
    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), data);
}

#[tokio::test]
async fn mismatched_destination_is_overwritten() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    write_file(&src, &[0x00u8; 10]);
    write_file(&server.path("dest.bin"), &[0xFFu8; 10]);

    assert!(run_transfer(&server, &src, "dest.bin", options()).await);
    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), vec![0x00u8; 10]);
}

#[tokio::test]
async fn identical_destination_is_skipped_without_a_data_channel() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(1024 * 1024);
    write_file(&src, &data);
    write_file(&server.path("dest.bin"), &data);

    let driver = server.driver(&src, "dest.bin", options());
    let pool = driver.start().await.unwrap();
    pool.await.unwrap();

    assert!(driver.is_transfer_success());
    assert_eq!(driver.files_transferred(), 1);
    // No receiver was ever opened, so nothing was ever acknowledged.
    assert_eq!(driver.server_received_size(), 0);
    assert!(server.state.receivers.is_empty());
}

#[tokio::test]
async fn destination_directory_gets_the_source_basename() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("named.bin");
    write_file(&src, b"contents");
    std::fs::create_dir_all(server.path("drop")).unwrap();

    assert!(run_transfer(&server, &src, "drop", options()).await);
    assert_eq!(std::fs::read(server.path("drop/named.bin")).unwrap(), b"contents");
}

#[tokio::test]
async fn recursive_tree_transfers_every_file() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    write_file(&client_dir.path().join("tree/a"), b"aaaaa");
    write_file(&client_dir.path().join("tree/sub/b"), b"bbbbb");
    write_file(&client_dir.path().join("tree/sub/c"), b"ccccc");

    let mut opts = options();
    opts.recursive = true;
    let driver = server.driver(&client_dir.path().join("tree"), "out", opts);
    let pool = driver.start().await.unwrap();
    pool.await.unwrap();

    assert!(driver.is_transfer_success());
    assert_eq!(driver.files_processed(), 3);
    assert_eq!(driver.files_transferred(), 3);
    assert_eq!(driver.transfer_size(), 15);
    assert_eq!(std::fs::read(server.path("out/a")).unwrap(), b"aaaaa");
    assert_eq!(std::fs::read(server.path("out/sub/b")).unwrap(), b"bbbbb");
    assert_eq!(std::fs::read(server.path("out/sub/c")).unwrap(), b"ccccc");
}

#[tokio::test]
async fn datagram_mode_round_trip() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(CHUNK_SIZE + 777);
    write_file(&src, &data);

    let mut opts = options();
    opts.tcp_mode = false;
    assert!(run_transfer(&server, &src, "dest.bin", opts).await);
    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), data);
}

#[tokio::test]
async fn concurrent_receivers_never_exceed_the_pool_size() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    for i in 0..6 {
        write_file(
            &client_dir.path().join(format!("tree/f{i}.bin")),
            &pattern(2 * CHUNK_SIZE + i),
        );
    }

    let receivers = server.state.receivers.clone();
    let watcher = tokio::spawn(async move {
        let mut max_live = 0usize;
        loop {
            max_live = max_live.max(receivers.len());
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            if max_live > 2 {
                break max_live;
            }
        }
    });

    let mut opts = options();
    opts.recursive = true;
    opts.parallelism = 2;
    assert!(run_transfer(&server, &client_dir.path().join("tree"), "out", opts).await);

    watcher.abort();
    let max_live = match watcher.await {
        Ok(n) => n,
        Err(_) => 2, // watcher never saw an overshoot before abort
    };
    assert!(max_live <= 2, "saw {max_live} live receivers with parallelism 2");
}

#[tokio::test]
async fn progress_counters_end_exact() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(2 * CHUNK_SIZE + 123);
    write_file(&src, &data);

    let driver = server.driver(&src, "dest.bin", options());
    let pool = driver.start().await.unwrap();
    pool.await.unwrap();

    assert!(driver.is_transfer_success());
    assert_eq!(driver.transfer_size(), data.len() as u64);
    assert_eq!(driver.server_received_size(), data.len() as u64);
    assert_eq!(driver.files_processed(), 1);
}

#[tokio::test]
async fn directory_source_without_recursive_fails_at_start() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();

    let driver = server.driver(client_dir.path(), "dest", options());
    let err = driver.start().await.err().expect("start must fail");
    assert!(
        matches!(err, ferry_core::TransferError::Config(_)),
        "expected a config error, got {err}"
    );
}

#[tokio::test]
async fn copy_status_applies_permissions() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    write_file(&src, b"mode bits travel too");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o640)).unwrap();
    }

    let mut opts = options();
    opts.copy_status = true;
    assert!(run_transfer(&server, &src, "dest.bin", opts).await);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(server.path("dest.bin")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }
}
