use std::collections::HashSet;
use std::future::Future;

use crate::backend::{BackendError, RemoteBlock};
use crate::uploader::observer::{UploadEvent, UploadObserver};
use crate::uploader::planner::{ChunkDescriptor, UploadPlan};

/// Planned chunks the backend does not hold yet, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingSet {
    chunks: Vec<ChunkDescriptor>,
    present_chunks: usize,
    present_bytes: u64,
}

impl MissingSet {
    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<ChunkDescriptor> {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes still to transfer.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.iter().map(|chunk| chunk.length).sum()
    }

    /// Planned chunks found on the backend.
    pub fn present_chunks(&self) -> usize {
        self.present_chunks
    }

    pub fn present_bytes(&self) -> u64 {
        self.present_bytes
    }
}

/// Removes from `plan` every chunk whose id is listed in `uploaded` with the
/// planned length. Blocks with a different length are stale and get resent.
pub fn missing_chunks(plan: &UploadPlan, uploaded: &[RemoteBlock]) -> MissingSet {
    let present: HashSet<(&str, u64)> = uploaded
        .iter()
        .map(|block| (block.name.as_str(), block.size))
        .collect();

    let (done, chunks): (Vec<_>, Vec<_>) = plan
        .chunks()
        .iter()
        .cloned()
        .partition(|chunk| present.contains(&(chunk.id.as_str(), chunk.length)));

    MissingSet {
        chunks,
        present_chunks: done.len(),
        present_bytes: done.iter().map(|chunk| chunk.length).sum(),
    }
}

/// Works out what is left to upload from the backend's uncommitted block
/// list. A failed query is reported and treated as "nothing uploaded yet".
pub async fn negotiate<Q>(plan: &UploadPlan, query: Q, observer: &dyn UploadObserver) -> MissingSet
where
    Q: Future<Output = Result<Vec<RemoteBlock>, BackendError>>,
{
    let uploaded = match query.await {
        Ok(blocks) => blocks,
        Err(error) => {
            tracing::warn!(%error, "uncommitted block query failed");
            observer.on_event(&UploadEvent::ResumeQueryFailed { error: &error });
            Vec::new()
        }
    };

    let missing = missing_chunks(plan, &uploaded);
    observer.on_event(&UploadEvent::Resumed {
        present_chunks: missing.present_chunks(),
        present_bytes: missing.present_bytes(),
        missing_chunks: missing.len(),
        missing_bytes: missing.total_bytes(),
    });
    missing
}
