//! Upload tunables and the backend limits they are clamped to.

use crate::error::UploadError;
use crate::uploader::retry::RetryPolicy;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Largest block the backend accepts.
pub const MAX_BLOCK_SIZE: u64 = 4 * MIB;

/// Most blocks one committed blob may consist of.
pub const MAX_BLOCK_COUNT: u64 = 50_000;

pub const DEFAULT_CHUNK_SIZE: u64 = 4 * MIB;

pub const DEFAULT_PARALLELISM: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Requested chunk size; anything above [`MAX_BLOCK_SIZE`] is clamped.
    pub chunk_size: u64,
    /// Chunks in flight at once.
    pub parallelism: usize,
    pub retry: RetryPolicy,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            retry: RetryPolicy::default(),
        }
    }
}

impl UploadOptions {
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The chunk size actually planned with.
    pub fn effective_chunk_size(&self) -> u64 {
        self.chunk_size.min(MAX_BLOCK_SIZE)
    }

    pub fn validate(&self) -> Result<(), UploadError> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize(self.chunk_size));
        }
        if self.parallelism == 0 {
            return Err(UploadError::InvalidParallelism);
        }
        Ok(())
    }
}
