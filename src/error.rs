use std::io;

use tokio::task::JoinError;

use crate::backend::BackendError;
use crate::uploader::retry::RetryError;
use crate::utils::multierr::MultiError;

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("chunk size must be positive, got {0}")]
    InvalidChunkSize(u64),

    #[error("parallelism must be positive")]
    InvalidParallelism,

    #[error("payload needs {count} chunks, at most {max} are allowed")]
    TooManyChunks { count: u64, max: u64 },

    #[error("reading chunk {index} from source: {source}")]
    Read {
        index: u32,
        #[source]
        source: io::Error,
    },

    #[error("{operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("{operation} gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("upload cancelled")]
    Cancelled,

    #[error("worker for chunk {index} did not finish: {source}")]
    Worker {
        index: u32,
        #[source]
        source: JoinError,
    },

    #[error("worker pool closed")]
    PoolClosed,

    #[error(transparent)]
    Workers(#[from] MultiError<UploadError>),
}

impl UploadError {
    /// Attaches the failed operation's name to a retry outcome.
    pub fn from_retry(operation: &'static str, err: RetryError<BackendError>) -> Self {
        match err {
            RetryError::Permanent(source) => UploadError::Backend { operation, source },
            RetryError::Exhausted { attempts, last } => UploadError::RetriesExhausted {
                operation,
                attempts,
                source: last,
            },
            RetryError::Cancelled => UploadError::Cancelled,
        }
    }
}
