//! JSON bodies and error codes of the block-store HTTP protocol, shared by
//! [`HttpBackend`](super::HttpBackend) and the development server.

use serde::{Deserialize, Serialize};

use super::{BackendError, RemoteBlock};

pub const CONTENT_MD5: &str = "Content-MD5";

pub const CODE_MD5_MISMATCH: &str = "Md5Mismatch";
pub const CODE_INVALID_BLOCK_LIST: &str = "InvalidBlockList";
pub const CODE_NOT_FOUND: &str = "NotFound";
pub const CODE_INVALID_REQUEST: &str = "InvalidRequest";
pub const CODE_INTERNAL: &str = "InternalError";

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockListResponse {
    pub uncommitted: Vec<RemoteBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockListRequest {
    pub latest: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitResponse {
    pub uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorBody {
    /// Maps a store-side failure onto its HTTP status and body.
    pub fn from_error(err: &BackendError) -> (u16, Self) {
        let (status, code, message) = match err {
            BackendError::NotFound(msg) => (404, CODE_NOT_FOUND, msg.clone()),
            BackendError::DigestMismatch(msg) => (400, CODE_MD5_MISMATCH, msg.clone()),
            BackendError::InvalidBlockList(msg) => (400, CODE_INVALID_BLOCK_LIST, msg.clone()),
            BackendError::InvalidRequest(msg) => (400, CODE_INVALID_REQUEST, msg.clone()),
            BackendError::Status { status, message } => (*status, CODE_INTERNAL, message.clone()),
            BackendError::Transport(err) => (500, CODE_INTERNAL, err.to_string()),
        };
        (
            status,
            Self {
                code: code.to_string(),
                message,
            },
        )
    }

    /// Rebuilds the client-side error from a non-success response.
    pub fn into_error(self, status: u16) -> BackendError {
        match (status, self.code.as_str()) {
            (404, _) => BackendError::NotFound(self.message),
            (_, CODE_MD5_MISMATCH) => BackendError::DigestMismatch(self.message),
            (_, CODE_INVALID_BLOCK_LIST) => BackendError::InvalidBlockList(self.message),
            (_, CODE_INVALID_REQUEST) => BackendError::InvalidRequest(self.message),
            _ => BackendError::Status {
                status,
                message: self.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_survive_the_wire() {
        let cases = [
            BackendError::NotFound("blob videos/a.mp4".into()),
            BackendError::DigestMismatch("block AAAAAA==".into()),
            BackendError::InvalidBlockList("unknown block AQAAAA==".into()),
        ];

        for err in cases {
            let expected = err.to_string();
            let (status, body) = ErrorBody::from_error(&err);
            let json = serde_json::to_string(&body).unwrap();
            let parsed: ErrorBody = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed.into_error(status).to_string(), expected);
        }
    }

    #[test]
    fn test_unknown_code_keeps_status() {
        let body = ErrorBody {
            code: "ServerBusy".into(),
            message: "try later".into(),
        };
        let err = body.into_error(503);
        assert!(matches!(err, BackendError::Status { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
