//! ChunkedStream — the byte-oriented data channel, one per file transfer.
//!
//! Isolates the transfer protocol from the difference between the two
//! transports: a plain TCP stream and the reliable-datagram layer. Callers
//! see `send_all`, `recv_into` (0 only on clean end-of-stream), and `close`.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpStream};

use crate::datagram::{DatagramListener, DatagramStream};
use crate::error::TransferError;

pub enum ChunkedStream {
    Tcp(TcpStream),
    Datagram(DatagramStream),
}

impl ChunkedStream {
    /// Connect a fresh data channel to `host:port` in the requested mode.
    pub async fn connect(host: &str, port: u16, tcp_mode: bool) -> Result<Self, TransferError> {
        if tcp_mode {
            let stream = TcpStream::connect((host, port))
                .await
                .map_err(|e| TransferError::Connect(format!("{host}:{port}: {e}")))?;
            Ok(Self::Tcp(stream))
        } else {
            let addr = lookup_host((host, port))
                .await
                .map_err(|e| TransferError::Connect(format!("{host}:{port}: {e}")))?
                .next()
                .ok_or_else(|| {
                    TransferError::Connect(format!("{host}:{port}: no address resolved"))
                })?;
            let stream = DatagramStream::connect(addr)
                .await
                .map_err(|e| TransferError::Connect(format!("{host}:{port}: {e}")))?;
            Ok(Self::Datagram(stream))
        }
    }

    /// Send every byte of `buf`, retrying the tail on partial writes.
    pub async fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.write_all(buf).await,
            Self::Datagram(stream) => stream.send_all(buf).await,
        }
    }

    /// Receive up to `buf.len()` bytes. Returns 0 only on clean end-of-stream.
    pub async fn recv_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf).await,
            Self::Datagram(stream) => stream.recv_into(buf).await,
        }
    }

    /// Flush and tear down the channel.
    pub async fn close(mut self) -> io::Result<()> {
        match &mut self {
            Self::Tcp(stream) => stream.shutdown().await,
            Self::Datagram(stream) => stream.close().await,
        }
    }
}

/// One-shot listener for a receiver's data channel: bound at construction,
/// accepts exactly one peer, in either transport mode.
pub enum DataListener {
    Tcp(TcpListener),
    Datagram(DatagramListener),
}

impl DataListener {
    pub async fn bind(tcp_mode: bool) -> io::Result<Self> {
        if tcp_mode {
            Ok(Self::Tcp(TcpListener::bind("0.0.0.0:0").await?))
        } else {
            Ok(Self::Datagram(DatagramListener::bind().await?))
        }
    }

    pub fn local_port(&self) -> io::Result<u16> {
        match self {
            Self::Tcp(listener) => Ok(listener.local_addr()?.port()),
            Self::Datagram(listener) => listener.local_port(),
        }
    }

    /// Accept the single expected connection, consuming the listener.
    pub async fn accept(self) -> io::Result<ChunkedStream> {
        match self {
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                tracing::debug!(%peer, "data channel accepted");
                Ok(ChunkedStream::Tcp(stream))
            }
            Self::Datagram(listener) => Ok(ChunkedStream::Datagram(listener.accept().await?)),
        }
    }
}
