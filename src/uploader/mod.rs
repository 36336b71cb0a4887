pub mod commit;
pub mod executor;
pub mod observer;
pub mod planner;
pub mod progress;
pub mod resume;
pub mod retry;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{BlockBackend, ObjectRef};
use crate::config::{MAX_BLOCK_COUNT, MAX_BLOCK_SIZE, UploadOptions};
use crate::error::UploadError;
use crate::source::ByteSource;
use executor::{ChunkUploader, dispatch};
use observer::{TracingObserver, UploadEvent, UploadObserver};
use planner::UploadPlan;
use progress::ProgressTracker;
use retry::execute_until_success;

/// Uploads payloads to a block backend, resuming whatever an earlier,
/// interrupted run of the same payload left behind.
pub struct Uploader<B> {
    backend: Arc<B>,
    options: UploadOptions,
    observer: Arc<dyn UploadObserver>,
    cancel: CancellationToken,
}

impl<B: BlockBackend> Uploader<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            options: UploadOptions::default(),
            observer: Arc::new(TracingObserver),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn UploadObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Cancelling `cancel` aborts running and future uploads.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Uploads the first `total_length` bytes of `source` to `object` and
    /// returns the URI of the committed blob.
    pub async fn upload<S: ByteSource>(
        &self,
        source: Arc<S>,
        total_length: u64,
        object: &ObjectRef,
    ) -> Result<String, UploadError> {
        self.options.validate()?;
        let chunk_size = self.options.effective_chunk_size();
        if chunk_size < self.options.chunk_size {
            tracing::warn!(
                requested = self.options.chunk_size,
                max = MAX_BLOCK_SIZE,
                "chunk size clamped to the backend maximum"
            );
        }
        let policy = &self.options.retry;
        let observer = &*self.observer;

        let plan = UploadPlan::new(total_length, chunk_size)?;
        if plan.len() as u64 > MAX_BLOCK_COUNT {
            return Err(UploadError::TooManyChunks {
                count: plan.len() as u64,
                max: MAX_BLOCK_COUNT,
            });
        }

        execute_until_success(
            policy,
            &self.cancel,
            || self.backend.ensure_container(&object.container),
            |error, attempt| {
                tracing::warn!(container = %object.container, attempt, %error, "create container failed")
            },
        )
        .await
        .map_err(|err| UploadError::from_retry("create container", err))?;

        observer.on_event(&UploadEvent::Planned {
            object,
            total_length,
            chunk_size,
            chunks: plan.len(),
        });

        let missing = resume::negotiate(
            &plan,
            self.backend.list_uncommitted_blocks(object),
            observer,
        )
        .await;

        let progress = Arc::new(ProgressTracker::new(missing.total_bytes()));
        let uploader = Arc::new(ChunkUploader::new(
            Arc::clone(&self.backend),
            source,
            object.clone(),
            policy.clone(),
            Arc::clone(&progress),
            Arc::clone(&self.observer),
        ));
        dispatch(
            missing.into_chunks(),
            self.options.parallelism,
            &self.cancel,
            |chunk, cancel| {
                let uploader = Arc::clone(&uploader);
                async move { uploader.upload(&chunk, &cancel).await }
            },
        )
        .await?;
        tracing::debug!(bytes = progress.done_bytes(), "all chunks uploaded");

        commit::commit(
            &*self.backend,
            object,
            &plan.block_ids(),
            policy,
            &self.cancel,
            observer,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::config::MIB;
    use crate::source::MemorySource;

    #[tokio::test]
    async fn test_upload_creates_container_and_commits() {
        let backend = Arc::new(MemoryBackend::new());
        let uploader = Uploader::new(Arc::clone(&backend))
            .with_options(UploadOptions::default().with_chunk_size(4));
        let object = ObjectRef::new("docs", "hello.txt");

        let uri = uploader
            .upload(Arc::new(MemorySource::new("hello world")), 11, &object)
            .await
            .unwrap();

        assert_eq!(uri, "memory://docs/hello.txt");
        assert_eq!(backend.committed_content(&object).await.unwrap(), "hello world");
        assert_eq!(backend.committed_ids(&object).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected_before_any_call() {
        let backend = Arc::new(MemoryBackend::new());
        let uploader = Uploader::new(Arc::clone(&backend))
            .with_options(UploadOptions::default().with_parallelism(0));

        let err = uploader
            .upload(Arc::new(MemorySource::new("x")), 1, &ObjectRef::new("c", "b"))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::InvalidParallelism));
        assert!(!backend.container_exists("c").await);
    }

    #[tokio::test]
    async fn test_block_count_limit() {
        let backend = Arc::new(MemoryBackend::new());
        let uploader = Uploader::new(Arc::clone(&backend))
            .with_options(UploadOptions::default().with_chunk_size(1));

        let err = uploader
            .upload(Arc::new(MemorySource::default()), MAX_BLOCK_COUNT + 1, &ObjectRef::new("c", "b"))
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::TooManyChunks { count, .. } if count == MAX_BLOCK_COUNT + 1));
        assert!(!backend.container_exists("c").await);
    }

    #[tokio::test]
    async fn test_oversized_chunks_are_clamped() {
        let backend = Arc::new(MemoryBackend::new());
        let uploader = Uploader::new(Arc::clone(&backend))
            .with_options(UploadOptions::default().with_chunk_size(64 * MIB));
        let payload = vec![7u8; (MAX_BLOCK_SIZE + 10) as usize];
        let object = ObjectRef::new("c", "big.bin");

        uploader
            .upload(Arc::new(MemorySource::new(payload)), MAX_BLOCK_SIZE + 10, &object)
            .await
            .unwrap();

        assert_eq!(backend.committed_ids(&object).await.unwrap().len(), 2);
    }
}
