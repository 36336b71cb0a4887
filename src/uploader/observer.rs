use std::fmt;
use std::sync::Arc;

use crate::backend::{BackendError, ObjectRef};
use crate::uploader::progress::ProgressReport;

/// Things worth reporting while an upload runs.
#[derive(Debug)]
pub enum UploadEvent<'a> {
    Planned {
        object: &'a ObjectRef,
        total_length: u64,
        chunk_size: u64,
        chunks: usize,
    },
    Resumed {
        present_chunks: usize,
        present_bytes: u64,
        missing_chunks: usize,
        missing_bytes: u64,
    },
    ResumeQueryFailed {
        error: &'a BackendError,
    },
    ChunkRetry {
        index: u32,
        attempt: u32,
        error: &'a BackendError,
    },
    ChunkUploaded(&'a ProgressReport),
    CommitRetry {
        attempt: u32,
        error: &'a BackendError,
    },
    Committed {
        uri: &'a str,
        blocks: usize,
    },
}

impl fmt::Display for UploadEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadEvent::Planned {
                object,
                total_length,
                chunk_size,
                chunks,
            } => write!(
                f,
                "Uploading {} bytes to {} in {} chunks of {} bytes",
                total_length, object, chunks, chunk_size
            ),
            UploadEvent::Resumed {
                present_chunks,
                present_bytes,
                missing_chunks,
                missing_bytes,
            } => write!(
                f,
                "{} chunks ({} bytes) already uploaded, {} chunks ({} bytes) to go",
                present_chunks, present_bytes, missing_chunks, missing_bytes
            ),
            UploadEvent::ResumeQueryFailed { error } => write!(
                f,
                "Could not list uploaded blocks, starting from scratch: {}",
                error
            ),
            UploadEvent::ChunkRetry {
                index,
                attempt,
                error,
            } => write!(
                f,
                "Error uploading chunk {} (attempt {}): {}",
                index, attempt, error
            ),
            UploadEvent::ChunkUploaded(report) => write!(f, "{}", report),
            UploadEvent::CommitRetry { attempt, error } => write!(
                f,
                "Error committing block list (attempt {}): {}",
                attempt, error
            ),
            UploadEvent::Committed { uri, blocks } => {
                write!(f, "Committed {} blocks to {}", blocks, uri)
            }
        }
    }
}

/// Receives upload events. Called from chunk workers concurrently.
pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent<'_>);
}

impl<F> UploadObserver for F
where
    F: Fn(&UploadEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &UploadEvent<'_>) {
        self(event)
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl UploadObserver for TracingObserver {
    fn on_event(&self, event: &UploadEvent<'_>) {
        match event {
            UploadEvent::Planned { object, chunks, .. } => {
                tracing::info!(%object, chunks, "{}", event)
            }
            UploadEvent::Resumed { .. } => tracing::info!("{}", event),
            // `negotiate` already warns.
            UploadEvent::ResumeQueryFailed { .. } => tracing::debug!("{}", event),
            UploadEvent::ChunkRetry { index, attempt, .. } => {
                tracing::warn!(chunk = index, attempt, "{}", event)
            }
            UploadEvent::ChunkUploaded(report) => {
                tracing::info!(chunk = report.chunk_index, "{}", event)
            }
            UploadEvent::CommitRetry { attempt, .. } => tracing::warn!(attempt, "{}", event),
            UploadEvent::Committed { .. } => tracing::info!("{}", event),
        }
    }
}

/// Caller-supplied line printer.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Renders every event as one line and hands it to a [`LogSink`].
#[derive(Clone)]
pub struct LogSinkObserver {
    sink: LogSink,
}

impl LogSinkObserver {
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }
}

impl fmt::Debug for LogSinkObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSinkObserver").finish_non_exhaustive()
    }
}

impl UploadObserver for LogSinkObserver {
    fn on_event(&self, event: &UploadEvent<'_>) {
        (self.sink)(&event.to_string());
    }
}
