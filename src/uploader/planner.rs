use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::UploadError;

/// Backend block id for the chunk at `index`: base64 of the index's
/// little-endian bytes. Every id has the same length, and re-planning the same
/// payload always yields the same ids.
pub fn block_id(index: u32) -> String {
    STANDARD.encode(index.to_le_bytes())
}

/// One contiguous byte range of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub offset: u64,
    pub length: u64,
    pub id: String,
}

/// Ordered chunk list covering `[0, total_length)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    total_length: u64,
    chunk_size: u64,
    chunks: Vec<ChunkDescriptor>,
}

impl UploadPlan {
    pub fn new(total_length: u64, chunk_size: u64) -> Result<Self, UploadError> {
        if chunk_size == 0 {
            return Err(UploadError::InvalidChunkSize(chunk_size));
        }

        let count = total_length.div_ceil(chunk_size);
        if count > u64::from(u32::MAX) {
            return Err(UploadError::TooManyChunks {
                count,
                max: u64::from(u32::MAX),
            });
        }

        let chunks = (0..count as u32)
            .map(|index| {
                let offset = u64::from(index) * chunk_size;
                ChunkDescriptor {
                    index,
                    offset,
                    length: chunk_size.min(total_length - offset),
                    id: block_id(index),
                }
            })
            .filter(|chunk| chunk.length > 0)
            .collect();

        Ok(Self {
            total_length,
            chunk_size,
            chunks,
        })
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// Ids of every planned chunk in payload order, as committed.
    pub fn block_ids(&self) -> Vec<String> {
        self.chunks.iter().map(|chunk| chunk.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn triples(plan: &UploadPlan) -> Vec<(u32, u64, u64)> {
        plan.chunks()
            .iter()
            .map(|c| (c.index, c.offset, c.length))
            .collect()
    }

    #[test]
    fn test_ten_bytes_in_chunks_of_four() {
        let plan = UploadPlan::new(10, 4).unwrap();
        assert_eq!(triples(&plan), vec![(0, 0, 4), (1, 4, 4), (2, 8, 2)]);
        assert_eq!(plan.block_ids(), vec![block_id(0), block_id(1), block_id(2)]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let plan = UploadPlan::new(8, 4).unwrap();
        assert_eq!(triples(&plan), vec![(0, 0, 4), (1, 4, 4)]);
    }

    #[test]
    fn test_empty_payload_has_no_chunks() {
        let plan = UploadPlan::new(0, 4).unwrap();
        assert!(plan.is_empty());
        assert!(plan.block_ids().is_empty());
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = UploadPlan::new(10, 0).unwrap_err();
        assert!(matches!(err, UploadError::InvalidChunkSize(0)));
    }

    #[test]
    fn test_too_many_chunks_rejected() {
        let err = UploadPlan::new(u64::MAX, 1).unwrap_err();
        assert!(matches!(err, UploadError::TooManyChunks { .. }));
    }

    #[test]
    fn test_block_ids_are_fixed_width_base64() {
        assert_eq!(block_id(0), "AAAAAA==");
        assert_eq!(block_id(1), "AQAAAA==");
        assert_eq!(block_id(256), "AAEAAA==");
        assert_eq!(block_id(u32::MAX).len(), block_id(0).len());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 200,
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_chunks_tile_the_payload(
            total_length in 0u64..100_000,
            chunk_size in 1u64..5_000,
        ) {
            let plan = UploadPlan::new(total_length, chunk_size).unwrap();

            prop_assert_eq!(plan.len() as u64, total_length.div_ceil(chunk_size));

            let mut next_offset = 0;
            for (position, chunk) in plan.chunks().iter().enumerate() {
                prop_assert_eq!(chunk.index as usize, position);
                prop_assert_eq!(chunk.offset, next_offset);
                prop_assert!(chunk.length > 0 && chunk.length <= chunk_size);
                prop_assert_eq!(&chunk.id, &block_id(chunk.index));
                next_offset += chunk.length;
            }
            prop_assert_eq!(next_offset, total_length);
        }

        #[test]
        fn prop_replanning_is_deterministic(
            total_length in 0u64..100_000,
            chunk_size in 1u64..5_000,
        ) {
            let first = UploadPlan::new(total_length, chunk_size).unwrap();
            let second = UploadPlan::new(total_length, chunk_size).unwrap();
            prop_assert_eq!(&first, &second);

            let ids: HashSet<_> = first.block_ids().into_iter().collect();
            prop_assert_eq!(ids.len(), first.len());
        }
    }
}
