//! ferry-core — shared types, constants, hashing, and the data-channel
//! stream used by both the ferry client and the ferryd server.

pub mod config;
pub mod datagram;
pub mod error;
pub mod hash;
pub mod proto;
pub mod stream;

pub use config::{TransferOptions, CHUNK_SIZE, NONCE_SIZE, TRANSACTION_LOG_FILENAME};
pub use error::TransferError;
pub use stream::{ChunkedStream, DataListener};
