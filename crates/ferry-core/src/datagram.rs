//! Reliable-datagram data channel — acknowledged, retransmitted datagrams
//! over UDP.
//!
//! Used when the client disables TCP mode. The protocol is stop-and-wait:
//! every DATA frame carries a sequence number and is retransmitted until the
//! matching ACK arrives; the receiver acknowledges duplicates without
//! re-delivering them. A FIN frame, acknowledged the same way, signals clean
//! end-of-stream. Bulk throughput is the transport's problem, not this
//! layer's: one file transfer owns one socket pair for its whole lifetime.
//!
//! Frame layout:
//!   [kind: u8] [seq: u32 BE] [payload...]      kind 1 = DATA, 2 = ACK, 3 = FIN
//!
//! The server side reuses the single UDP socket bound by the receiver for
//! both accepting the peer and carrying the transfer, so the advertised
//! port never conflicts with the data flow.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

const KIND_DATA: u8 = 1;
const KIND_ACK: u8 = 2;
const KIND_FIN: u8 = 3;

const HEADER_LEN: usize = 5;

/// Payload per datagram. Kept well under the UDP maximum; a chunk spanning
/// several frames is reassembled transparently by the byte-stream interface.
const MAX_PAYLOAD: usize = 32 * 1024;

const RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(200);
const MAX_RETRANSMITS: u32 = 10;
const FIN_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Dialed the peer; sends DATA and the closing FIN.
    Connector,
    /// Accepted the peer; only receives and acknowledges.
    Accepted,
}

/// One reliable byte stream over a connected UDP socket.
pub struct DatagramStream {
    socket: UdpSocket,
    role: Role,
    /// Next sequence number to send.
    next_seq: u32,
    /// Next sequence number expected from the peer.
    expected_seq: u32,
    /// Received payload not yet handed to the caller.
    pending: VecDeque<u8>,
    eof: bool,
    fin_sent: bool,
}

impl DatagramStream {
    /// Dial the peer's listening socket.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        Ok(Self::new(socket, Role::Connector))
    }

    fn new(socket: UdpSocket, role: Role) -> Self {
        Self {
            socket,
            role,
            next_seq: 0,
            expected_seq: 0,
            pending: VecDeque::new(),
            eof: false,
            fin_sent: false,
        }
    }

    /// Send all of `data`, splitting across frames as needed. Returns once
    /// every frame has been acknowledged.
    pub async fn send_all(&mut self, data: &[u8]) -> io::Result<()> {
        for part in data.chunks(MAX_PAYLOAD) {
            self.send_frame(KIND_DATA, part).await?;
        }
        Ok(())
    }

    /// Receive the next in-order payload bytes into `buf`. Returns 0 only on
    /// clean end-of-stream (the peer's FIN).
    pub async fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.pending.is_empty() {
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().expect("pending not empty");
            }
            return Ok(n);
        }
        if self.eof {
            return Ok(0);
        }

        let mut frame = vec![0u8; HEADER_LEN + MAX_PAYLOAD];
        loop {
            let len = self.socket.recv(&mut frame).await?;
            if len < HEADER_LEN {
                continue;
            }
            let kind = frame[0];
            let seq = u32::from_be_bytes(frame[1..5].try_into().expect("4 bytes"));

            match kind {
                KIND_DATA => {
                    if seq == self.expected_seq {
                        self.send_ack(seq).await?;
                        self.expected_seq = self.expected_seq.wrapping_add(1);
                        let payload = &frame[HEADER_LEN..len];
                        let n = buf.len().min(payload.len());
                        buf[..n].copy_from_slice(&payload[..n]);
                        self.pending.extend(&payload[n..]);
                        return Ok(n);
                    } else if seq_before(seq, self.expected_seq) {
                        // Retransmitted duplicate: its ACK was lost.
                        self.send_ack(seq).await?;
                    }
                }
                KIND_FIN => {
                    if seq == self.expected_seq {
                        self.send_ack(seq).await?;
                        self.expected_seq = self.expected_seq.wrapping_add(1);
                        self.eof = true;
                        return Ok(0);
                    } else if seq_before(seq, self.expected_seq) {
                        self.send_ack(seq).await?;
                    }
                }
                _ => {
                    tracing::trace!(kind, "unexpected frame kind, discarding");
                }
            }
        }
    }

    /// Signal clean end-of-stream. Only the connecting side sends FIN; for
    /// the accepted side this is a no-op.
    ///
    /// A receiver that stopped at its expected size never reads the FIN, so
    /// delivery is best-effort: a few attempts, then give up quietly.
    pub async fn close(&mut self) -> io::Result<()> {
        if self.role == Role::Accepted || self.fin_sent {
            return Ok(());
        }
        self.fin_sent = true;

        let seq = self.next_seq;
        let mut frame = [0u8; HEADER_LEN];
        frame[0] = KIND_FIN;
        frame[1..5].copy_from_slice(&seq.to_be_bytes());

        for _ in 0..FIN_ATTEMPTS {
            if self.socket.send(&frame).await.is_err() {
                // Peer socket already gone; nothing left to signal.
                return Ok(());
            }
            if let Ok(Ok(())) = timeout(RETRANSMIT_TIMEOUT, self.await_ack(seq)).await {
                self.next_seq = self.next_seq.wrapping_add(1);
                return Ok(());
            }
        }
        tracing::trace!(seq, "fin unacknowledged, peer already finalized");
        Ok(())
    }

    async fn send_frame(&mut self, kind: u8, payload: &[u8]) -> io::Result<()> {
        let seq = self.next_seq;
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.push(kind);
        frame.extend_from_slice(&seq.to_be_bytes());
        frame.extend_from_slice(payload);

        for attempt in 0..MAX_RETRANSMITS {
            self.socket.send(&frame).await?;
            match timeout(RETRANSMIT_TIMEOUT, self.await_ack(seq)).await {
                Ok(result) => {
                    result?;
                    self.next_seq = self.next_seq.wrapping_add(1);
                    return Ok(());
                }
                Err(_) => {
                    tracing::trace!(seq, attempt, "ack timeout, retransmitting");
                }
            }
        }

        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no ack for frame {seq} after {MAX_RETRANSMITS} attempts"),
        ))
    }

    async fn await_ack(&self, seq: u32) -> io::Result<()> {
        let mut buf = [0u8; 64];
        loop {
            let len = self.socket.recv(&mut buf).await?;
            if len >= HEADER_LEN && buf[0] == KIND_ACK {
                let acked = u32::from_be_bytes(buf[1..5].try_into().expect("4 bytes"));
                if acked == seq {
                    return Ok(());
                }
                // Stale ack for an earlier frame; keep waiting.
            }
        }
    }

    async fn send_ack(&self, seq: u32) -> io::Result<()> {
        let mut frame = [0u8; HEADER_LEN];
        frame[0] = KIND_ACK;
        frame[1..5].copy_from_slice(&seq.to_be_bytes());
        self.socket.send(&frame).await?;
        Ok(())
    }
}

/// True when `a` precedes `b` in wrapping sequence order.
fn seq_before(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < u32::MAX / 2
}

/// One-shot listener: binds an ephemeral UDP port, then converts itself into
/// a stream connected to the first peer that sends a datagram.
pub struct DatagramListener {
    socket: UdpSocket,
}

impl DatagramListener {
    pub async fn bind() -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Wait for the first datagram, lock the socket to that peer, and hand
    /// the socket over as the transfer stream. The probing read peeks, so
    /// the first frame is still delivered through the stream.
    pub async fn accept(self) -> io::Result<DatagramStream> {
        let mut probe = [0u8; 1];
        let (_, peer) = self.socket.peek_from(&mut probe).await?;
        self.socket.connect(peer).await?;
        Ok(DatagramStream::new(self.socket, Role::Accepted))
    }
}
