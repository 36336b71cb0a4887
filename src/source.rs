//! Random-access byte sources the uploader reads chunks from.

use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A read-only payload that can be read at arbitrary byte ranges.
///
/// Workers read disjoint ranges concurrently, so implementations must not
/// keep a shared cursor.
pub trait ByteSource: Send + Sync + 'static {
    /// Reads up to `length` bytes starting at `offset`. Fewer bytes are
    /// returned only when the source ends first.
    fn read_range(
        &self,
        offset: u64,
        length: u64,
    ) -> impl Future<Output = io::Result<Bytes>> + Send;
}

/// A local file, reopened for every read.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the file on disk.
    pub async fn len(&self) -> io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }
}

impl ByteSource for FileSource {
    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Bytes> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buf = Vec::with_capacity(length as usize);
        file.take(length).read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// An in-memory buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Bytes,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteSource for MemorySource {
    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Bytes> {
        let len = self.len();
        let start = offset.min(len);
        let end = offset.saturating_add(length).min(len);
        Ok(self.data.slice(start as usize..end as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_file_reads_exact_range() {
        let file = temp_file(b"0123456789");
        let source = FileSource::new(file.path());

        assert_eq!(source.len().await.unwrap(), 10);
        assert_eq!(&source.read_range(4, 4).await.unwrap()[..], b"4567");
        assert_eq!(source.path(), file.path());
    }

    #[tokio::test]
    async fn test_file_short_read_at_end() {
        let file = temp_file(b"0123456789");
        let source = FileSource::new(file.path());

        // Only two bytes remain past offset 8.
        assert_eq!(&source.read_range(8, 4).await.unwrap()[..], b"89");
        assert!(source.read_range(20, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_missing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileSource::new(dir.path().join("gone.bin"));

        let err = source.read_range(0, 1).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_disjoint_reads() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let file = temp_file(&data);
        let source = std::sync::Arc::new(FileSource::new(file.path()));

        let mut handles = Vec::new();
        for i in 0..8u64 {
            let source = std::sync::Arc::clone(&source);
            handles.push(tokio::spawn(async move {
                (i, source.read_range(i * 512, 512).await.unwrap())
            }));
        }

        for handle in handles {
            let (i, bytes) = handle.await.unwrap();
            let start = (i * 512) as usize;
            assert_eq!(&bytes[..], &data[start..start + 512]);
        }
    }

    #[tokio::test]
    async fn test_memory_clamps_to_buffer() {
        let source = MemorySource::new(&b"AABBCCDDEE"[..]);

        assert_eq!(source.len(), 10);
        assert_eq!(&source.read_range(0, 4).await.unwrap()[..], b"AABB");
        assert_eq!(&source.read_range(8, 4).await.unwrap()[..], b"EE");
        assert!(source.read_range(12, 4).await.unwrap().is_empty());
        assert!(MemorySource::default().is_empty());
    }
}
