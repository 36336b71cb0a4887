use tokio_util::sync::CancellationToken;

use crate::backend::{BlockBackend, ObjectRef};
use crate::error::UploadError;
use crate::uploader::observer::{UploadEvent, UploadObserver};
use crate::uploader::retry::{RetryPolicy, execute_until_success};

/// Publishes `block_ids`, in order, as the content of `object` and returns
/// its URI. Must only run once every listed block is on the backend.
pub async fn commit<B: BlockBackend>(
    backend: &B,
    object: &ObjectRef,
    block_ids: &[String],
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    observer: &dyn UploadObserver,
) -> Result<String, UploadError> {
    let uri = execute_until_success(
        policy,
        cancel,
        move || backend.put_block_list(object, block_ids),
        |error, attempt| observer.on_event(&UploadEvent::CommitRetry { attempt, error }),
    )
    .await
    .map_err(|err| UploadError::from_retry("commit block list", err))?;

    observer.on_event(&UploadEvent::Committed {
        uri: &uri,
        blocks: block_ids.len(),
    });
    Ok(uri)
}
