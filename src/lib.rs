//! Resumable, parallel, integrity-checked uploads of large payloads to block
//! stores.
//!
//! A payload is split into fixed-size chunks with deterministic block ids.
//! Chunks the store already holds from an earlier attempt are skipped, the
//! rest are uploaded concurrently with an MD5 digest each, and finally the
//! full ordered id list is committed as the blob's content.

pub mod backend;
pub mod config;
pub mod digest;
pub mod error;
pub mod server;
pub mod source;
pub mod uploader;
pub mod utils;

pub use backend::{BackendError, BlockBackend, HttpBackend, MemoryBackend, ObjectRef, RemoteBlock};
pub use config::UploadOptions;
pub use digest::ChunkDigest;
pub use error::UploadError;
pub use source::{ByteSource, FileSource, MemorySource};
pub use uploader::Uploader;
pub use uploader::observer::{LogSink, LogSinkObserver, TracingObserver, UploadEvent, UploadObserver};
pub use uploader::progress::{ProgressReport, ProgressTracker};
pub use uploader::retry::RetryPolicy;
