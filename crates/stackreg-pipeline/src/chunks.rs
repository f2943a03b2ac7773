//! Temporal chunk planning.
//!
//! The frame range `[0, T)` is divided into contiguous chunks of at most
//! `frames_per_split` frames; the last chunk may be shorter. Template-update
//! iterations sample a subset of chunks; the final pass always registers all
//! of them.

use stackreg_core::Real;

/// A half-open frame-index range processed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the plan.
    pub index: usize,
    /// First frame (inclusive).
    pub start: usize,
    /// Past-the-end frame (exclusive).
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// Partition `[0, t)` into `ceil(t / frames_per_split)` contiguous chunks.
pub fn plan_chunks(t: usize, frames_per_split: usize) -> Vec<Chunk> {
    debug_assert!(frames_per_split > 0);
    let mut chunks = Vec::with_capacity(t.div_ceil(frames_per_split));
    let mut start = 0;
    let mut index = 0;
    while start < t {
        let end = (start + frames_per_split).min(t);
        chunks.push(Chunk { index, start, end });
        start = end;
        index += 1;
    }
    chunks
}

/// Resolve how many chunks a template-update iteration samples.
///
/// `None` means every chunk. A request larger than the number of existing
/// chunks saturates at the chunk count: this is an intentional clipping
/// policy, not a configuration failure.
pub fn resolve_split_count(requested: Option<usize>, num_chunks: usize) -> usize {
    match requested {
        Some(requested) => requested.min(num_chunks),
        None => num_chunks,
    }
}

/// Pick `count` chunks, evenly spaced across the plan.
///
/// Deterministic: template refinement must be reproducible run-to-run, so
/// the sample is spread by index rather than drawn randomly. `count` is
/// expected to be already resolved against the chunk count.
pub fn sample_chunks(chunks: &[Chunk], count: usize) -> Vec<Chunk> {
    let n = chunks.len();
    if count >= n {
        return chunks.to_vec();
    }
    let mut picked = Vec::with_capacity(count);
    let mut last: Option<usize> = None;
    for i in 0..count {
        let position = if count == 1 {
            0.0
        } else {
            i as Real * (n - 1) as Real / (count - 1) as Real
        };
        let index = position.round() as usize;
        if last != Some(index) {
            picked.push(chunks[index]);
            last = Some(index);
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partitions(t: usize, frames_per_split: usize) {
        let chunks = plan_chunks(t, frames_per_split);
        assert_eq!(chunks.len(), t.div_ceil(frames_per_split));
        let mut cursor = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.start, cursor);
            assert!(chunk.len() <= frames_per_split);
            assert!(!chunk.is_empty());
            cursor = chunk.end;
        }
        assert_eq!(cursor, t);
    }

    #[test]
    fn chunks_partition_exactly() {
        assert_partitions(500, 125);
        assert_partitions(500, 200);
        assert_partitions(1, 1000);
        assert_partitions(7, 3);
        assert_partitions(1000, 1);
    }

    #[test]
    fn last_chunk_may_be_shorter() {
        let chunks = plan_chunks(10, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 2);
    }

    #[test]
    fn split_count_saturates() {
        assert_eq!(resolve_split_count(Some(10), 4), 4);
        assert_eq!(resolve_split_count(Some(3), 4), 3);
        assert_eq!(resolve_split_count(Some(4), 4), 4);
        assert_eq!(resolve_split_count(None, 4), 4);
    }

    #[test]
    fn sampling_is_evenly_spaced_and_deterministic() {
        let chunks = plan_chunks(100, 10);
        let picked = sample_chunks(&chunks, 3);
        let indices: Vec<usize> = picked.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 5, 9]);
        assert_eq!(picked, sample_chunks(&chunks, 3));
    }

    #[test]
    fn sampling_everything_returns_all_chunks() {
        let chunks = plan_chunks(50, 10);
        assert_eq!(sample_chunks(&chunks, 5), chunks);
        assert_eq!(sample_chunks(&chunks, 8), chunks);
    }

    #[test]
    fn sampling_one_takes_the_first_chunk() {
        let chunks = plan_chunks(50, 10);
        let picked = sample_chunks(&chunks, 1);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].index, 0);
    }
}
