//! Resume negotiation and transaction-log durability.

use crate::*;
use ferry::sender::{negotiate, ResumeDecision};
use ferry_core::config::CHUNK_SIZE;
use ferry_core::hash::partial_hash;
use ferry_core::proto::{ReceiverState, StartReceiveRequest};
use ferry_core::stream::ChunkedStream;
use ferryd::txlog::TransactionLog;

#[tokio::test]
async fn matching_prefix_resumes_at_the_block_boundary() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(2 * CHUNK_SIZE + CHUNK_SIZE / 2);
    write_file(&src, &data);
    // Pre-plant the first two chunks of the source as the server copy.
    write_file(&server.path("dest.bin"), &data[..2 * CHUNK_SIZE]);

    let control = server.control();
    let server_path = server.path("dest.bin").to_string_lossy().into_owned();
    let decision = negotiate(&control, &src, &server_path, data.len() as u64)
        .await
        .unwrap();
    assert_eq!(decision, ResumeDecision::Resume { blocks: 2 });

    assert!(run_transfer(&server, &src, "dest.bin", options()).await);
    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), data);
}

#[tokio::test]
async fn differing_prefix_negotiates_a_fresh_start() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(2 * CHUNK_SIZE);
    write_file(&src, &data);

    let mut planted = data[..CHUNK_SIZE].to_vec();
    planted[10] ^= 0xFF;
    write_file(&server.path("dest.bin"), &planted);

    let control = server.control();
    let server_path = server.path("dest.bin").to_string_lossy().into_owned();
    let decision = negotiate(&control, &src, &server_path, data.len() as u64)
        .await
        .unwrap();
    assert_eq!(decision, ResumeDecision::Fresh);
    // The mismatched copy was truncated as part of the decision.
    assert_eq!(std::fs::metadata(server.path("dest.bin")).unwrap().len(), 0);
}

#[tokio::test]
async fn server_copy_larger_than_source_is_replaced() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(CHUNK_SIZE);
    write_file(&src, &data);
    // Same prefix, but a chunk and a half longer than the source.
    write_file(&server.path("dest.bin"), &pattern(2 * CHUNK_SIZE + CHUNK_SIZE / 2));

    let control = server.control();
    let server_path = server.path("dest.bin").to_string_lossy().into_owned();
    let decision = negotiate(&control, &src, &server_path, data.len() as u64)
        .await
        .unwrap();
    assert_eq!(decision, ResumeDecision::Fresh);

    assert!(run_transfer(&server, &src, "dest.bin", options()).await);
    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), data);
}

/// Interrupt a transfer after two chunks, restart the server over the same
/// root, and let a second run pick up exactly where the first stopped.
#[tokio::test]
async fn partial_receipt_survives_a_server_restart_and_resumes() {
    let server = spawn_server().await;
    let client_dir = tempfile::tempdir().unwrap();
    let src = client_dir.path().join("src.bin");
    let data = pattern(2 * CHUNK_SIZE + CHUNK_SIZE / 2);
    write_file(&src, &data);
    let source_hash = partial_hash(&src, 0).unwrap();

    let control = server.control();
    let validated = control
        .validate_path("dest.bin", &src.to_string_lossy(), true)
        .await
        .unwrap();
    let server_path = validated.resolved.unwrap();
    assert_eq!(control.probe_file(&server_path).await.unwrap(), 0);

    // Hand-drive a transfer that dies after two chunks.
    let open = control.open_receiver(true).await.unwrap();
    control
        .start_receive(
            open.receiver_id,
            &StartReceiveRequest {
                path: server_path.clone(),
                blocks: 0,
                file_size: data.len() as u64,
                source_hash: source_hash.clone(),
            },
        )
        .await
        .unwrap();

    let mut stream = ChunkedStream::connect("127.0.0.1", open.port, true).await.unwrap();
    stream.send_all(open.nonce.as_bytes()).await.unwrap();
    stream.send_all(&data[..2 * CHUNK_SIZE]).await.unwrap();
    stream.close().await.unwrap();

    // The receiver finalizes the partial receipt into the log.
    loop {
        let status = control.receiver_status(open.receiver_id).await.unwrap();
        if status.state == ReceiverState::Done {
            assert_eq!(status.bytes, 2 * CHUNK_SIZE as u64);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // Kill the server; the log on disk still knows about the transfer.
    let log_path = server.log_path();
    let root = server.shutdown();
    let reopened = TransactionLog::open(log_path);
    let record = reopened.lookup(&source_hash).expect("partial record survives");
    assert_eq!(record.bytes, 2 * CHUNK_SIZE as u64);
    drop(reopened);

    // Restart over the same root; a normal run resumes and completes.
    let server = spawn_server_at(root).await;
    let control = server.control();
    let decision = negotiate(&control, &src, &server_path, data.len() as u64)
        .await
        .unwrap();
    assert_eq!(decision, ResumeDecision::Resume { blocks: 2 });

    assert!(run_transfer(&server, &src, "dest.bin", options()).await);
    assert_eq!(std::fs::read(server.path("dest.bin")).unwrap(), data);
    assert!(server.state.log.lock().await.is_empty());
}
