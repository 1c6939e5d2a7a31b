use sha1::{Digest, Sha1};
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::constants::SEND_BLOCK_SIZE;
use crate::error::Result;

/// Running SHA-1 over the bytes of one payload
#[derive(Clone, Default)]
pub struct IntegrityVerifier {
    hasher: Sha1,
    bytes: u64,
}

impl fmt::Debug for IntegrityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrityVerifier")
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, block: &[u8]) {
        self.hasher.update(block);
        self.bytes += block.len() as u64;
    }

    /// Number of bytes fed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex digest, 40 characters
    pub fn finalize(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

/// Compute the SHA-1 of a file on disk
pub async fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).await?;
    let mut verifier = IntegrityVerifier::new();
    let mut buffer = vec![0u8; SEND_BLOCK_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        verifier.update(&buffer[..n]);
    }

    Ok(verifier.finalize())
}

/// Digests of the same payload computed independently by both peers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    pub sender_digest: String,
    pub receiver_digest: String,
}

impl ChecksumRecord {
    pub fn is_match(&self) -> bool {
        self.sender_digest
            .eq_ignore_ascii_case(&self.receiver_digest)
    }
}
