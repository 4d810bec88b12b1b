//! Streamed artifact hashing.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Fixed chunk size for all artifact hashing; peak memory is independent
/// of artifact size.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Hex SHA-256 and byte length of a finished artifact, computed in
/// fixed-size chunks.
pub async fn sha256_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_match_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"abc").unwrap();
        let (sum, len) = sha256_file(&path).await.unwrap();
        assert_eq!(len, 3);
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn hashes_multi_chunk_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![0x5au8; CHUNK_SIZE * 2 + 17];
        std::fs::write(&path, &data).unwrap();
        let (sum, len) = sha256_file(&path).await.unwrap();
        assert_eq!(len, data.len() as u64);
        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(sum, expected);
    }
}
