use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
};
use std::{collections::HashMap, future::Future, io, sync::Arc};
use tokio::net::TcpListener;

use crate::backend::wire::{
    BlockListRequest, BlockListResponse, CONTENT_MD5, CommitResponse, ErrorBody,
};
use crate::backend::{BackendError, BlockBackend, MemoryBackend, ObjectRef};
use crate::config::MAX_BLOCK_SIZE;
use crate::digest::ChunkDigest;

type Params = Query<HashMap<String, String>>;

fn error_response(err: BackendError) -> Response {
    let (status, body) = ErrorBody::from_error(&err);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    error_response(BackendError::InvalidRequest(message.into()))
}

async fn create_container(
    State(store): State<Arc<MemoryBackend>>,
    Path(container): Path<String>,
) -> Response {
    match store.ensure_container(&container).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_blob(
    State(store): State<Arc<MemoryBackend>>,
    Path((container, blob)): Path<(String, String)>,
    Query(params): Params,
) -> Response {
    let object = ObjectRef::new(container, blob);

    match params.get("comp").map(String::as_str) {
        Some("blocklist") => match store.list_uncommitted_blocks(&object).await {
            Ok(uncommitted) => Json(BlockListResponse { uncommitted }).into_response(),
            Err(err) => error_response(err),
        },
        Some(other) => bad_request(format!("unsupported comp {other}")),
        None => match store.committed_content(&object).await {
            Some(content) => content.into_response(),
            None => error_response(BackendError::NotFound(format!("blob {object}"))),
        },
    }
}

async fn put_blob(
    State(store): State<Arc<MemoryBackend>>,
    Path((container, blob)): Path<(String, String)>,
    Query(params): Params,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let object = ObjectRef::new(container, blob);

    match params.get("comp").map(String::as_str) {
        Some("block") => {
            let block_id = match params.get("blockid") {
                Some(id) => id,
                None => return bad_request("missing blockid"),
            };
            let digest = match headers
                .get(CONTENT_MD5)
                .and_then(|value| value.to_str().ok())
                .and_then(ChunkDigest::from_base64)
            {
                Some(digest) => digest,
                None => return bad_request(format!("missing or malformed {CONTENT_MD5}")),
            };

            match store.put_block(&object, block_id, body, digest).await {
                Ok(()) => StatusCode::CREATED.into_response(),
                Err(err) => {
                    tracing::debug!(%object, %block_id, %err, "block rejected");
                    error_response(err)
                }
            }
        }
        Some("blocklist") => {
            let request: BlockListRequest = match serde_json::from_slice(&body) {
                Ok(request) => request,
                Err(err) => return bad_request(format!("block list body: {err}")),
            };
            match store.put_block_list(&object, &request.latest).await {
                Ok(uri) => {
                    tracing::info!(%object, blocks = request.latest.len(), "blob committed");
                    (StatusCode::CREATED, Json(CommitResponse { uri })).into_response()
                }
                Err(err) => error_response(err),
            }
        }
        _ => bad_request("expected comp=block or comp=blocklist"),
    }
}

pub fn build_app(store: Arc<MemoryBackend>) -> Router {
    Router::new()
        .route("/{container}", put(create_container))
        .route("/{container}/{*blob}", get(get_blob).put(put_blob))
        .layer(DefaultBodyLimit::max(2 * MAX_BLOCK_SIZE as usize))
        .with_state(store)
}

/// Serves `store` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, store: Arc<MemoryBackend>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, build_app(store))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Runs the development block store until Ctrl-C.
pub async fn startup(address: String, port: u16) -> io::Result<()> {
    let addr = format!("{}:{}", address, port);
    let listener = TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;
    let store = Arc::new(MemoryBackend::with_base_uri(format!("http://{}", local)));

    tracing::info!("Listening on http://{}", local);

    serve(listener, store, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "waiting for Ctrl-C failed");
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HttpBackend;
    use crate::config::UploadOptions;
    use crate::source::MemorySource;
    use crate::uploader::Uploader;
    use crate::uploader::retry::RetryPolicy;
    use std::time::Duration;

    async fn spawn_store() -> (String, Arc<MemoryBackend>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let store = Arc::new(MemoryBackend::with_base_uri(endpoint.clone()));
        tokio::spawn(serve(listener, Arc::clone(&store), std::future::pending()));
        (endpoint, store)
    }

    #[tokio::test]
    async fn test_upload_over_http() {
        let (endpoint, store) = spawn_store().await;
        let backend = Arc::new(HttpBackend::new(&endpoint, Duration::from_secs(10)).unwrap());
        let object = ObjectRef::new("videos", "2024/clip.bin");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let options = UploadOptions::default()
            .with_chunk_size(1_000)
            .with_parallelism(3)
            .with_retry(RetryPolicy::immediate().with_max_attempts(3));
        let uri = Uploader::new(backend)
            .with_options(options)
            .upload(Arc::new(MemorySource::new(payload.clone())), payload.len() as u64, &object)
            .await
            .unwrap();

        assert_eq!(uri, format!("{endpoint}/videos/2024/clip.bin"));
        assert_eq!(store.committed_content(&object).await.unwrap(), payload);

        let fetched = reqwest::get(&uri).await.unwrap().bytes().await.unwrap();
        assert_eq!(fetched, payload);
    }

    #[tokio::test]
    async fn test_block_list_round_trips_over_http() {
        let (endpoint, _) = spawn_store().await;
        let backend = HttpBackend::new(&endpoint, Duration::from_secs(10)).unwrap();
        let object = ObjectRef::new("c", "b");
        backend.ensure_container("c").await.unwrap();
        // Creating it twice is fine.
        backend.ensure_container("c").await.unwrap();

        backend
            .put_block(&object, "AAAAAA==", Bytes::from_static(b"abcd"), ChunkDigest::compute(b"abcd"))
            .await
            .unwrap();

        let blocks = backend.list_uncommitted_blocks(&object).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].name, "AAAAAA==");
        assert_eq!(blocks[0].size, 4);
    }

    #[tokio::test]
    async fn test_digest_mismatch_is_retryable() {
        let (endpoint, _) = spawn_store().await;
        let backend = HttpBackend::new(&endpoint, Duration::from_secs(10)).unwrap();
        backend.ensure_container("c").await.unwrap();

        let err = backend
            .put_block(
                &ObjectRef::new("c", "b"),
                "AAAAAA==",
                Bytes::from_static(b"abcd"),
                ChunkDigest::compute(b"abce"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::DigestMismatch(_)), "{err}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_objects_map_to_not_found() {
        let (endpoint, _) = spawn_store().await;
        let backend = HttpBackend::new(&endpoint, Duration::from_secs(10)).unwrap();

        let err = backend
            .list_uncommitted_blocks(&ObjectRef::new("nope", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)), "{err}");
        assert!(!err.is_retryable());

        let err = backend
            .put_block_list(&ObjectRef::new("nope", "b"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn test_requests_without_digest_are_rejected() {
        let (endpoint, _) = spawn_store().await;
        let client = reqwest::Client::new();
        client.put(format!("{endpoint}/c")).send().await.unwrap();

        let response = client
            .put(format!("{endpoint}/c/b?comp=block&blockid=AAAAAA%3D%3D"))
            .body("abcd")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = response.json().await.unwrap();
        assert_eq!(body.code, "InvalidRequest");
    }
}
