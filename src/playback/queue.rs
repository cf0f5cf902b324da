//! Pending chunk buffer ordered by sequence index.

use super::chunk::QueuedChunk;

/// Chunks waiting to be played, kept in ascending `sequence_index` order
/// regardless of arrival order.
///
/// Expected depth is a handful of chunks (network jitter), so insertion is
/// a linear scan into a `Vec`.
#[derive(Debug, Default)]
pub struct PendingQueue {
    chunks: Vec<QueuedChunk>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a chunk at its ordered position.
    ///
    /// Returns the chunk back if one with the same index is already queued;
    /// the first one inserted wins.
    pub fn insert(&mut self, chunk: QueuedChunk) -> Result<(), QueuedChunk> {
        let pos = self
            .chunks
            .iter()
            .position(|c| c.sequence_index >= chunk.sequence_index)
            .unwrap_or(self.chunks.len());

        if self
            .chunks
            .get(pos)
            .map_or(false, |c| c.sequence_index == chunk.sequence_index)
        {
            return Err(chunk);
        }

        self.chunks.insert(pos, chunk);
        Ok(())
    }

    /// Remove and return the chunk carrying exactly `sequence_index`
    pub fn take(&mut self, sequence_index: u64) -> Option<QueuedChunk> {
        let pos = self
            .chunks
            .iter()
            .position(|c| c.sequence_index == sequence_index)?;
        Some(self.chunks.remove(pos))
    }

    pub fn contains(&self, sequence_index: u64) -> bool {
        self.chunks.iter().any(|c| c.sequence_index == sequence_index)
    }

    /// Number of queued chunks whose index is already behind `next_expected`
    pub fn stale_count(&self, next_expected: u64) -> usize {
        self.chunks
            .iter()
            .take_while(|c| c.sequence_index < next_expected)
            .count()
    }

    /// Lowest queued index, if any
    pub fn first_index(&self) -> Option<u64> {
        self.chunks.first().map(|c| c.sequence_index)
    }

    pub fn indices(&self) -> Vec<u64> {
        self.chunks.iter().map(|c| c.sequence_index).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
