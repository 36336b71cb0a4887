use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// MD5 fingerprint of one chunk, sent next to the payload as `Content-MD5`.
///
/// A fresh hashing context is created per call, so concurrent workers never
/// share digest state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkDigest([u8; 16]);

impl ChunkDigest {
    pub fn compute(data: &[u8]) -> Self {
        Self(md5::compute(data).0)
    }

    /// Parses the base64 wire form. Returns `None` unless it decodes to
    /// exactly 16 bytes.
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = STANDARD.decode(encoded.trim()).ok()?;
        let digest: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(digest))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
