//! Shift aggregation across chunks.
//!
//! Chunks may complete in any order when dispatched in parallel; the
//! aggregator reorders per-chunk batches by their starting frame and checks
//! that the reassembled sequence covers every frame exactly once before
//! exposing it.

use crate::error::CorrectionError;

/// One chunk's worth of per-frame values, tagged with its frame offset.
#[derive(Debug, Clone)]
pub struct ShiftBatch<T> {
    /// Global index of the batch's first frame.
    pub start: usize,
    pub values: Vec<T>,
}

/// Collects per-chunk batches and restores global frame order.
#[derive(Debug)]
pub struct ShiftAggregator<T> {
    batches: Vec<ShiftBatch<T>>,
}

impl<T> Default for ShiftAggregator<T> {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
        }
    }
}

impl<T> ShiftAggregator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: ShiftBatch<T>) {
        self.batches.push(batch);
    }

    pub fn extend(&mut self, batches: impl IntoIterator<Item = ShiftBatch<T>>) {
        self.batches.extend(batches);
    }

    /// Sort batches by starting frame and concatenate.
    ///
    /// Fails when the batches do not tile `[0, expected_len)` contiguously:
    /// every frame must be recorded exactly once.
    pub fn into_ordered(mut self, expected_len: usize) -> Result<Vec<T>, CorrectionError> {
        self.batches.sort_by_key(|batch| batch.start);
        let mut ordered = Vec::with_capacity(expected_len);
        for batch in self.batches {
            if batch.start != ordered.len() {
                return Err(CorrectionError::IncompleteShiftRecord {
                    expected: expected_len,
                    got: ordered.len(),
                });
            }
            ordered.extend(batch.values);
        }
        if ordered.len() != expected_len {
            return Err(CorrectionError::IncompleteShiftRecord {
                expected: expected_len,
                got: ordered.len(),
            });
        }
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_batches_are_sorted_by_frame() {
        let mut agg = ShiftAggregator::new();
        agg.push(ShiftBatch {
            start: 4,
            values: vec![4, 5, 6],
        });
        agg.push(ShiftBatch {
            start: 0,
            values: vec![0, 1],
        });
        agg.push(ShiftBatch {
            start: 2,
            values: vec![2, 3],
        });
        let ordered = agg.into_ordered(7).unwrap();
        assert_eq!(ordered, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn gap_in_batches_is_an_error() {
        let mut agg = ShiftAggregator::new();
        agg.push(ShiftBatch {
            start: 0,
            values: vec![0, 1],
        });
        agg.push(ShiftBatch {
            start: 3,
            values: vec![3],
        });
        assert!(matches!(
            agg.into_ordered(4),
            Err(CorrectionError::IncompleteShiftRecord { .. })
        ));
    }

    #[test]
    fn short_record_is_an_error() {
        let mut agg: ShiftAggregator<i32> = ShiftAggregator::new();
        agg.push(ShiftBatch {
            start: 0,
            values: vec![1, 2],
        });
        assert!(matches!(
            agg.into_ordered(5),
            Err(CorrectionError::IncompleteShiftRecord {
                expected: 5,
                got: 2
            })
        ));
    }
}
