//! The remote block store the uploader talks to.
//!
//! A blob is assembled in two phases: blocks are uploaded individually and
//! stay *uncommitted* until a block list naming them in order is committed.

mod http;
mod memory;
pub mod wire;

use std::fmt;
use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::digest::ChunkDigest;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// Names the target blob inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub container: String,
    pub blob: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: blob.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.blob)
    }
}

/// An uploaded block as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteBlock {
    pub name: String,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("digest mismatch: {0}")]
    DigestMismatch(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid block list: {0}")]
    InvalidBlockList(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
}

impl BackendError {
    /// Whether the failure is worth retrying. Transport failures, throttling,
    /// server errors and digest mismatches are; everything else means the
    /// request can never succeed as issued.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport(err) => {
                !err.is_builder() && err.status().is_none_or(|s| is_retryable_status(s.as_u16()))
            }
            BackendError::DigestMismatch(_) => true,
            BackendError::NotFound(_)
            | BackendError::InvalidBlockList(_)
            | BackendError::InvalidRequest(_) => false,
            BackendError::Status { status, .. } => is_retryable_status(*status),
        }
    }
}

/// Whether an HTTP status is transient: request timeout, throttling or any 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || status >= 500
}

/// Operations a block store must offer. Implementations are shared by all
/// chunk workers and must tolerate concurrent calls.
pub trait BlockBackend: Send + Sync + 'static {
    /// Creates the container if it does not exist yet.
    fn ensure_container(&self, container: &str)
    -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Lists blocks uploaded to `object` but not committed yet. Fails when the
    /// blob (or its container) does not exist.
    fn list_uncommitted_blocks(
        &self,
        object: &ObjectRef,
    ) -> impl Future<Output = Result<Vec<RemoteBlock>, BackendError>> + Send;

    /// Stores one block. The backend checks `digest` against the received
    /// bytes and rejects the block on mismatch.
    fn put_block(
        &self,
        object: &ObjectRef,
        block_id: &str,
        data: Bytes,
        digest: ChunkDigest,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Commits the blob from previously uploaded blocks, in the given order,
    /// and returns its address.
    fn put_block_list(
        &self,
        object: &ObjectRef,
        block_ids: &[String],
    ) -> impl Future<Output = Result<String, BackendError>> + Send;
}
