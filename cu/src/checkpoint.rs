// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! Memory checkpointer (spec §4.6): a streaming content hash over (possibly
//! gzip-encoded) linear memory, plus the `exceedsMax*` resource predicates.
//!
//! Grounded on `fvm::blockstore::buffered.rs`'s `std::io::Read`-adapter
//! idiom for constant-overhead streaming access, composing
//! `flate2::read::GzDecoder` with `sha2::Sha256` so the whole memory blob is
//! never held twice in the host's address space.

use std::io::{self, Read};

use cu_shared::{Gas, Memory, MemoryEncoding, MemoryPages};
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};

use crate::error::MemoryHashError;

/// Hash `memory`'s bytes, gunzipping first if `encoding` says they're
/// gzip-compressed. Returns the lowercase hex SHA-256 digest.
pub fn hash(memory: &Memory) -> Result<String, MemoryHashError> {
    let mut hasher = Sha256::new();
    match memory.encoding() {
        MemoryEncoding::None => {
            hash_stream(memory.bytes(), &mut hasher)?;
        }
        MemoryEncoding::Gzip => {
            let mut decoder = GzDecoder::new(memory.bytes());
            hash_reader(&mut decoder, &mut hasher)?;
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hash_stream(mut bytes: &[u8], hasher: &mut Sha256) -> io::Result<()> {
    hash_reader(&mut bytes, hasher)
}

/// 64KiB chunks: large enough to amortise syscall/frame overhead, small
/// enough that hashing a multi-gigabyte linear memory never requires
/// holding more than one chunk plus the running digest state.
fn hash_reader(reader: &mut impl Read, hasher: &mut Sha256) -> io::Result<()> {
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

pub fn exceeds_max_memory(pages: MemoryPages, limit: MemoryPages) -> bool {
    pages.as_u32() > limit.as_u32()
}

pub fn exceeds_max_compute(used: Gas, limit: Gas) -> bool {
    used > limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_plain_memory() {
        let memory = Memory::new(b"hello world".to_vec(), MemoryEncoding::None);
        let digest = hash(&memory).unwrap();
        assert_eq!(digest.len(), 64);
        // Same bytes, same digest, regardless of how the `Memory` got built.
        let again = Memory::new(b"hello world".to_vec(), MemoryEncoding::None);
        assert_eq!(digest, hash(&again).unwrap());
    }

    #[test]
    fn gzip_and_plain_of_the_same_bytes_hash_the_same() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let raw = b"some linear memory contents".to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let gzipped = encoder.finish().unwrap();

        let plain_digest = hash(&Memory::new(raw, MemoryEncoding::None)).unwrap();
        let gzip_digest = hash(&Memory::new(gzipped, MemoryEncoding::Gzip)).unwrap();
        assert_eq!(plain_digest, gzip_digest);
    }

    #[test]
    fn exceeds_predicates() {
        assert!(exceeds_max_memory(MemoryPages::new(10), MemoryPages::new(9)));
        assert!(!exceeds_max_memory(MemoryPages::new(9), MemoryPages::new(9)));
        assert!(exceeds_max_compute(Gas::new(100), Gas::new(99)));
        assert!(!exceeds_max_compute(Gas::new(99), Gas::new(99)));
    }
}
