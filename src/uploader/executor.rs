use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::backend::{BlockBackend, ObjectRef};
use crate::digest::ChunkDigest;
use crate::error::UploadError;
use crate::source::ByteSource;
use crate::uploader::observer::{UploadEvent, UploadObserver};
use crate::uploader::planner::ChunkDescriptor;
use crate::uploader::progress::ProgressTracker;
use crate::uploader::retry::{RetryPolicy, execute_until_success};
use crate::utils::limited_spawner::LimitedSpawner;
use crate::utils::multierr::MultiError;

/// Transfers single chunks: read, digest, put with retries, record progress.
pub struct ChunkUploader<B, S> {
    backend: Arc<B>,
    source: Arc<S>,
    object: ObjectRef,
    policy: RetryPolicy,
    progress: Arc<ProgressTracker>,
    observer: Arc<dyn UploadObserver>,
}

impl<B: BlockBackend, S: ByteSource> ChunkUploader<B, S> {
    pub fn new(
        backend: Arc<B>,
        source: Arc<S>,
        object: ObjectRef,
        policy: RetryPolicy,
        progress: Arc<ProgressTracker>,
        observer: Arc<dyn UploadObserver>,
    ) -> Self {
        Self {
            backend,
            source,
            object,
            policy,
            progress,
            observer,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Uploads one chunk and returns the number of bytes sent.
    ///
    /// A short read is only expected at the end of the source; whatever was
    /// read is sent as the block. Progress always advances by the planned
    /// chunk length.
    pub async fn upload(
        &self,
        chunk: &ChunkDescriptor,
        cancel: &CancellationToken,
    ) -> Result<u64, UploadError> {
        let data = self
            .source
            .read_range(chunk.offset, chunk.length)
            .await
            .map_err(|source| UploadError::Read {
                index: chunk.index,
                source,
            })?;
        let bytes = data.len() as u64;
        if bytes < chunk.length {
            tracing::debug!(
                chunk = chunk.index,
                planned = chunk.length,
                read = bytes,
                "source ended early"
            );
        }

        let digest = ChunkDigest::compute(&data);
        let backend = &*self.backend;
        let object = &self.object;
        let id = chunk.id.as_str();

        let attempt_started = execute_until_success(
            &self.policy,
            cancel,
            move || {
                let data = data.clone();
                async move {
                    let started = Instant::now();
                    backend
                        .put_block(object, id, data, digest)
                        .await
                        .map(|()| started)
                }
            },
            |error, attempt| {
                self.observer.on_event(&UploadEvent::ChunkRetry {
                    index: chunk.index,
                    attempt,
                    error,
                })
            },
        )
        .await
        .map_err(|err| UploadError::from_retry("upload block", err))?;

        let report = self.progress.add(chunk.index, chunk.length, attempt_started);
        self.observer.on_event(&UploadEvent::ChunkUploaded(&report));
        Ok(bytes)
    }
}

/// Runs `worker` for every chunk, at most `parallelism` at a time, starting
/// them in the given order. Returns once every started worker has finished.
///
/// The first failing worker cancels the rest. A single failure is returned
/// as is, several are wrapped in [`MultiError`].
pub async fn dispatch<W, Fut>(
    chunks: Vec<ChunkDescriptor>,
    parallelism: usize,
    cancel: &CancellationToken,
    worker: W,
) -> Result<(), UploadError>
where
    W: Fn(ChunkDescriptor, CancellationToken) -> Fut,
    Fut: Future<Output = Result<u64, UploadError>> + Send + 'static,
{
    if parallelism == 0 {
        return Err(UploadError::InvalidParallelism);
    }

    let spawner = LimitedSpawner::new(parallelism);
    let abort = cancel.child_token();
    // Workers are detached tasks; stop them if this future is dropped.
    let _abort_on_drop = abort.clone().drop_guard();
    let mut handles = Vec::with_capacity(chunks.len());
    let mut failures = Vec::new();
    let mut interrupted = false;

    for chunk in chunks {
        let index = chunk.index;
        let work = worker(chunk, abort.clone());
        // Dropped without disarming when the worker fails or panics.
        let guard = abort.clone().drop_guard();
        let task = async move {
            let result = work.await;
            if matches!(result, Ok(_) | Err(UploadError::Cancelled)) {
                let _ = guard.disarm();
            }
            result
        };

        match spawner.spawn_unless_cancelled(task, &abort).await {
            Ok(Some(handle)) => handles.push((index, handle)),
            Ok(None) => {
                interrupted = true;
                break;
            }
            Err(_) => {
                abort.cancel();
                failures.push(UploadError::PoolClosed);
                break;
            }
        }
    }

    let finished = futures::future::join_all(
        handles
            .into_iter()
            .map(|(index, handle)| async move { (index, handle.await) }),
    )
    .await;

    for (index, result) in finished {
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(UploadError::Cancelled)) => interrupted = true,
            Ok(Err(err)) => {
                tracing::error!(chunk = index, error = %err, "chunk upload failed");
                failures.push(err);
            }
            Err(source) => {
                tracing::error!(chunk = index, error = %source, "chunk worker died");
                failures.push(UploadError::Worker { index, source });
            }
        }
    }

    match failures.len() {
        0 if interrupted => Err(UploadError::Cancelled),
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(MultiError::new(failures).into()),
    }
}
