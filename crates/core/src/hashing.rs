//! SHA-256 content hashing for relocation idempotence.

use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

/// Read chunk size (1 MiB).
const CHUNK_BYTES: usize = 1024 * 1024;

/// Compute the SHA-256 hex digest of a file's contents, reading in chunks
/// so large reports never land in memory whole.
pub async fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_BYTES];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}
