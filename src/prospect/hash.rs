//! Single-pass content hashing.
//!
//! Every chunk read from the source is fed to SHA-256 and XXH3-128 in the
//! same iteration, so a file is read exactly once and memory stays at one
//! chunk buffer regardless of file size.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use xxhash_rust::xxh3::Xxh3;

use crate::types::ContentHashes;

/// Read size for one hashing step.
pub const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("Failed to open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Read failed for {path} after {bytes_read} bytes: {source}")]
    Read {
        path: PathBuf,
        bytes_read: u64,
        source: io::Error,
    },

    #[error("{path} changed while hashing: read {bytes_read} bytes, file now has {current_len}")]
    Changed {
        path: PathBuf,
        bytes_read: u64,
        current_len: u64,
    },
}

impl HashError {
    /// True when the file disappeared before it could be opened.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HashError::Open { source, .. } if source.kind() == ErrorKind::NotFound)
    }
}

/// Error from [`HashEngine::hash_reader`], carrying how far the pass got.
#[derive(Debug)]
pub struct StreamError {
    pub bytes_read: u64,
    pub source: io::Error,
}

#[derive(Debug, Clone)]
pub struct HashEngine {
    chunk_size: usize,
}

impl Default for HashEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HashEngine {
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Engine with a different read size. Digests do not depend on it.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Hash everything the reader yields until EOF.
    ///
    /// A read error ends the pass with no digests; there is no partial result.
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> Result<ContentHashes, StreamError> {
        let mut strong = Sha256::new();
        let mut fast = Xxh3::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(StreamError {
                        bytes_read: total,
                        source,
                    });
                }
            };
            strong.update(&buffer[..n]);
            fast.update(&buffer[..n]);
            total += n as u64;
        }

        Ok(ContentHashes {
            sha256: strong.finalize().into(),
            xxh128: fast.digest128(),
            size_bytes: total,
        })
    }

    /// Hash a file on disk.
    ///
    /// The open handle is re-checked after the pass; if the file length no
    /// longer matches what was read, the file was truncated or extended
    /// underneath us and the digests are discarded.
    pub fn hash_file(&self, path: &Path) -> Result<ContentHashes, HashError> {
        let mut file = File::open(path).map_err(|source| HashError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let hashes = self
            .hash_reader(&mut file)
            .map_err(|e| HashError::Read {
                path: path.to_path_buf(),
                bytes_read: e.bytes_read,
                source: e.source,
            })?;

        verify_length(path, &file, hashes)
    }
}

/// Keep `hashes` only if the open file still has the length that was read.
fn verify_length(path: &Path, file: &File, hashes: ContentHashes) -> Result<ContentHashes, HashError> {
    let current_len = file
        .metadata()
        .map_err(|source| HashError::Read {
            path: path.to_path_buf(),
            bytes_read: hashes.size_bytes,
            source,
        })?
        .len();
    if current_len != hashes.size_bytes {
        return Err(HashError::Changed {
            path: path.to_path_buf(),
            bytes_read: hashes.size_bytes,
            current_len,
        });
    }
    Ok(hashes)
}
