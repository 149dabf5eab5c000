//! Nonce enforcement on the data channel.

use crate::*;
use ferry_core::config::NONCE_SIZE;
use ferry_core::proto::{ReceiverState, StartReceiveRequest};
use tokio::io::AsyncWriteExt;

async fn wait_for_state(
    control: &ferry::ControlClient,
    receiver_id: u64,
    wanted: ReceiverState,
) -> ReceiverState {
    for _ in 0..200 {
        let status = control.receiver_status(receiver_id).await.unwrap();
        if status.state == wanted {
            return status.state;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    control.receiver_status(receiver_id).await.unwrap().state
}

#[tokio::test]
async fn wrong_nonce_is_rejected_and_the_file_is_untouched() {
    let server = spawn_server().await;
    write_file(&server.path("dest.bin"), b"precious bytes stay put");
    let server_path = server.path("dest.bin").to_string_lossy().into_owned();

    let control = server.control();
    let open = control.open_receiver(true).await.unwrap();
    control
        .start_receive(
            open.receiver_id,
            &StartReceiveRequest {
                path: server_path,
                blocks: 0,
                file_size: 100,
                source_hash: "feedface".repeat(8),
            },
        )
        .await
        .unwrap();

    // Correct length, wrong digits.
    let mut wrong = open.nonce.into_bytes();
    wrong[0] = if wrong[0] == b'0' { b'1' } else { b'0' };
    assert_eq!(wrong.len(), NONCE_SIZE);

    let mut conn = tokio::net::TcpStream::connect(("127.0.0.1", open.port))
        .await
        .unwrap();
    conn.write_all(&wrong).await.unwrap();
    conn.write_all(b"payload that must never land").await.ok();

    let state = wait_for_state(&control, open.receiver_id, ReceiverState::Failed).await;
    assert_eq!(state, ReceiverState::Failed);
    assert_eq!(
        std::fs::read(server.path("dest.bin")).unwrap(),
        b"precious bytes stay put"
    );
}

#[tokio::test]
async fn closing_before_the_nonce_fails_the_receiver() {
    let server = spawn_server().await;
    let server_path = server.path("dest.bin").to_string_lossy().into_owned();

    let control = server.control();
    let open = control.open_receiver(true).await.unwrap();
    control
        .start_receive(
            open.receiver_id,
            &StartReceiveRequest {
                path: server_path,
                blocks: 0,
                file_size: 100,
                source_hash: "deadbeef".repeat(8),
            },
        )
        .await
        .unwrap();

    let conn = tokio::net::TcpStream::connect(("127.0.0.1", open.port))
        .await
        .unwrap();
    drop(conn);

    let state = wait_for_state(&control, open.receiver_id, ReceiverState::Failed).await;
    assert_eq!(state, ReceiverState::Failed);
}
