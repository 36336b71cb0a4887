use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Response, StatusCode, Url};

use super::wire::{BlockListRequest, BlockListResponse, CONTENT_MD5, CommitResponse, ErrorBody};
use super::{BackendError, BlockBackend, ObjectRef, RemoteBlock};
use crate::digest::ChunkDigest;

/// Block-store client speaking the HTTP protocol served by
/// [`crate::server`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: Url,
}

impl HttpBackend {
    /// `timeout` bounds every single request, body transfer included.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, BackendError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| BackendError::InvalidRequest(format!("endpoint {endpoint}: {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(BackendError::InvalidRequest(format!(
                "endpoint {endpoint} cannot carry a path"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, BackendError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BackendError::InvalidRequest(format!("endpoint {} cannot carry a path", self.endpoint))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn blob_url(&self, object: &ObjectRef) -> Result<Url, BackendError> {
        self.url(std::iter::once(object.container.as_str()).chain(object.blob.split('/')))
    }
}

/// Passes successful responses through and turns everything else into a
/// [`BackendError`].
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).unwrap_or_else(|_| ErrorBody {
        code: String::new(),
        message: if text.is_empty() {
            status.to_string()
        } else {
            text
        },
    });
    Err(body.into_error(status.as_u16()))
}

impl BlockBackend for HttpBackend {
    async fn ensure_container(&self, container: &str) -> Result<(), BackendError> {
        let response = self.client.put(self.url([container])?).send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn list_uncommitted_blocks(
        &self,
        object: &ObjectRef,
    ) -> Result<Vec<RemoteBlock>, BackendError> {
        let response = self
            .client
            .get(self.blob_url(object)?)
            .query(&[("comp", "blocklist"), ("blocklisttype", "uncommitted")])
            .send()
            .await?;
        let list: BlockListResponse = check(response).await?.json().await?;
        Ok(list.uncommitted)
    }

    async fn put_block(
        &self,
        object: &ObjectRef,
        block_id: &str,
        data: Bytes,
        digest: ChunkDigest,
    ) -> Result<(), BackendError> {
        let response = self
            .client
            .put(self.blob_url(object)?)
            .query(&[("comp", "block"), ("blockid", block_id)])
            .header(CONTENT_MD5, digest.to_base64())
            .body(data)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn put_block_list(
        &self,
        object: &ObjectRef,
        block_ids: &[String],
    ) -> Result<String, BackendError> {
        let request = BlockListRequest {
            latest: block_ids.to_vec(),
        };
        let response = self
            .client
            .put(self.blob_url(object)?)
            .query(&[("comp", "blocklist")])
            .json(&request)
            .send()
            .await?;
        let committed: CommitResponse = check(response).await?.json().await?;
        Ok(committed.uri)
    }
}
