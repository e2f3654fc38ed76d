//! BLAKE3 file hashing.
//!
//! Records and quarantine entries carry the BLAKE3 digest of the scanned
//! content; the quarantine store also uses it to verify cross-filesystem
//! moves.

use crate::core::types::FileHash;

use std::io::Read;
use std::path::Path;

/// Computes BLAKE3 digests of files and byte buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileHasher;

impl FileHasher {
    /// Creates a new hasher.
    pub fn new() -> Self {
        Self
    }

    /// Hashes an in-memory buffer.
    pub fn hash_bytes(&self, data: &[u8]) -> FileHash {
        FileHash(blake3::hash(data).to_hex().to_string())
    }

    /// Hashes a file, streaming it in 64 KiB chunks.
    pub fn hash_file(&self, path: &Path) -> std::io::Result<FileHash> {
        let file = std::fs::File::open(path)?;
        let mut reader = std::io::BufReader::new(file);
        self.hash_reader(&mut reader)
    }

    /// Hashes everything a reader yields.
    pub fn hash_reader<R: Read>(&self, reader: &mut R) -> std::io::Result<FileHash> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(FileHash(hasher.finalize().to_hex().to_string()))
    }
}
