//! Chunked hash indexer (§4.5): builds a `hash -> [index...]` lookup over
//! a recording's messages without blocking the scheduler. Indexes are
//! built in chunks of ~256 messages, yielding between chunks so a large
//! recording's index build doesn't stall other sessions' heartbeats.

use replay_protocol::LazyRecording;
use std::collections::HashMap;

const CHUNK_SIZE: usize = 256;

/// Hash -> ascending list of message indices sharing that hash. Consumers
/// track which indices have already been used for at-most-once playback
/// matching (§4.6).
#[derive(Debug, Default, Clone)]
pub struct HashIndex {
    by_hash: HashMap<String, Vec<usize>>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, hash: String, index: usize) {
        self.by_hash.entry(hash).or_default().push(index);
    }

    /// The lowest-index entry for `hash` that isn't in `used`, per the
    /// at-most-once matching rule (§4.6).
    pub fn lowest_unused(&self, hash: &str, used: &std::collections::HashSet<usize>) -> Option<usize> {
        self.by_hash
            .get(hash)
            .into_iter()
            .flatten()
            .find(|idx| !used.contains(idx))
            .copied()
    }

    pub fn indices_for(&self, hash: &str) -> &[usize] {
        self.by_hash.get(hash).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.by_hash.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `HashIndex` built incrementally from a `LazyRecording`'s still-raw
/// messages, built once up front by [`build_hash_index`] and then used for
/// the lifetime of a playback session.
pub type LazyHashIndex = HashIndex;

/// Builds a hash index over `recording`'s raw messages, yielding to the
/// scheduler every [`CHUNK_SIZE`] messages (§4.5).
pub async fn build_hash_index(recording: &LazyRecording) -> LazyHashIndex {
    let mut index = HashIndex::new();
    for (chunk_start, chunk) in recording.raw_messages.chunks(CHUNK_SIZE).enumerate() {
        for (offset, raw) in chunk.iter().enumerate() {
            if let Some(hash) = raw.peek_hash() {
                index.insert(hash, chunk_start * CHUNK_SIZE + offset);
            }
        }
        tokio::task::yield_now().await;
    }
    index
}
