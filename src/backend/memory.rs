use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tokio::sync::RwLock;

use super::{BackendError, BlockBackend, ObjectRef, RemoteBlock};
use crate::digest::ChunkDigest;

#[derive(Debug, Default)]
struct BlobState {
    /// Uploaded but not committed, in upload order.
    uncommitted: Vec<(String, Bytes)>,
    committed: Vec<(String, Bytes)>,
}

/// An in-process block store with block-blob semantics.
///
/// Backs the development server and the test suites.
#[derive(Debug)]
pub struct MemoryBackend {
    base_uri: String,
    containers: RwLock<HashMap<String, HashMap<String, BlobState>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_base_uri("memory://")
    }

    /// Committed blobs are addressed as `{base_uri}/{container}/{blob}`; a
    /// trailing slash on `base_uri` is not doubled.
    pub fn with_base_uri(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            containers: RwLock::new(HashMap::new()),
        }
    }

    pub fn object_uri(&self, object: &ObjectRef) -> String {
        let separator = if self.base_uri.ends_with('/') { "" } else { "/" };
        format!("{}{}{}", self.base_uri, separator, object)
    }

    pub async fn container_exists(&self, container: &str) -> bool {
        self.containers.read().await.contains_key(container)
    }

    /// Block ids of the committed blob, in commit order.
    pub async fn committed_ids(&self, object: &ObjectRef) -> Option<Vec<String>> {
        let containers = self.containers.read().await;
        let blob = containers.get(&object.container)?.get(&object.blob)?;
        Some(blob.committed.iter().map(|(id, _)| id.clone()).collect())
    }

    /// Content of the committed blob.
    pub async fn committed_content(&self, object: &ObjectRef) -> Option<Bytes> {
        let containers = self.containers.read().await;
        let blob = containers.get(&object.container)?.get(&object.blob)?;
        let mut content = BytesMut::new();
        for (_, data) in &blob.committed {
            content.extend_from_slice(data);
        }
        Some(content.freeze())
    }
}

fn container_not_found(container: &str) -> BackendError {
    BackendError::NotFound(format!("container {container}"))
}

impl BlockBackend for MemoryBackend {
    async fn ensure_container(&self, container: &str) -> Result<(), BackendError> {
        let mut containers = self.containers.write().await;
        containers.entry(container.to_string()).or_default();
        Ok(())
    }

    async fn list_uncommitted_blocks(
        &self,
        object: &ObjectRef,
    ) -> Result<Vec<RemoteBlock>, BackendError> {
        let containers = self.containers.read().await;
        let blobs = containers
            .get(&object.container)
            .ok_or_else(|| container_not_found(&object.container))?;
        let blob = blobs
            .get(&object.blob)
            .ok_or_else(|| BackendError::NotFound(format!("blob {object}")))?;

        Ok(blob
            .uncommitted
            .iter()
            .map(|(id, data)| RemoteBlock {
                name: id.clone(),
                size: data.len() as u64,
            })
            .collect())
    }

    async fn put_block(
        &self,
        object: &ObjectRef,
        block_id: &str,
        data: Bytes,
        digest: ChunkDigest,
    ) -> Result<(), BackendError> {
        if block_id.is_empty() {
            return Err(BackendError::InvalidRequest("empty block id".into()));
        }
        let actual = ChunkDigest::compute(&data);
        if actual != digest {
            return Err(BackendError::DigestMismatch(format!(
                "block {block_id}: expected {digest}, received {actual}"
            )));
        }

        let mut containers = self.containers.write().await;
        let blobs = containers
            .get_mut(&object.container)
            .ok_or_else(|| container_not_found(&object.container))?;
        let blob = blobs.entry(object.blob.clone()).or_default();

        // Re-uploading a block id replaces the earlier payload.
        match blob.uncommitted.iter_mut().find(|(id, _)| id == block_id) {
            Some(slot) => slot.1 = data,
            None => blob.uncommitted.push((block_id.to_string(), data)),
        }
        Ok(())
    }

    async fn put_block_list(
        &self,
        object: &ObjectRef,
        block_ids: &[String],
    ) -> Result<String, BackendError> {
        let mut containers = self.containers.write().await;
        let blobs = containers
            .get_mut(&object.container)
            .ok_or_else(|| container_not_found(&object.container))?;
        let blob = blobs.entry(object.blob.clone()).or_default();

        let mut committed = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            let data = blob
                .uncommitted
                .iter()
                .chain(blob.committed.iter())
                .find(|(candidate, _)| candidate == id)
                .map(|(_, data)| data.clone())
                .ok_or_else(|| {
                    BackendError::InvalidBlockList(format!("block {id} was never uploaded"))
                })?;
            committed.push((id.clone(), data));
        }

        // Blocks left out of the list are discarded on commit.
        blob.committed = committed;
        blob.uncommitted.clear();
        Ok(self.object_uri(object))
    }
}
