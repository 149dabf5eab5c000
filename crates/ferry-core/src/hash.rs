//! Streaming SHA-256 over file prefixes.
//!
//! The digest identifies equal-or-compatible file prefixes between client
//! and server; collision resistance is the only cryptographic requirement.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::CHUNK_SIZE;

/// Hash the first `blocks * CHUNK_SIZE` bytes of `path`, or the entire file
/// when `blocks == 0`. Returns the hex-encoded digest.
///
/// Reads chunk by chunk; safe under concurrent calls on the same path.
pub fn partial_hash(path: &Path, blocks: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut hashed_blocks = 0u64;

    loop {
        if blocks != 0 && hashed_blocks == blocks {
            break;
        }
        let filled = read_chunk(&mut file, &mut buf)?;
        if filled == 0 {
            break;
        }
        hasher.update(&buf[..filled]);
        hashed_blocks += 1;
        if filled < CHUNK_SIZE {
            break;
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Fill `buf` from `reader`, tolerating short reads. Returns the number of
/// bytes filled; less than `buf.len()` only at end of file.
pub fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
