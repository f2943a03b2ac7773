//! Dataset-source seam: shape-queryable, range-readable frame sequences.
//!
//! The correction pipeline only ever touches frame data through
//! [`ImageStackSource`], so out-of-core or memory-mapped sources can be
//! plugged in without changing the orchestration. [`InMemoryStack`] is the
//! default owned implementation.

use std::ops::Range;

use thiserror::Error;

use crate::math::Frame;

/// Shape of a time-series stack: `t` frames of `h` rows by `w` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StackShape {
    pub t: usize,
    pub h: usize,
    pub w: usize,
}

impl std::fmt::Display for StackShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.t, self.h, self.w)
    }
}

/// Errors raised by stack sources.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("stack contains no frames")]
    Empty,
    #[error("frame {index} has shape {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        index: usize,
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },
    #[error("frame range [{start}, {end}) is outside the stack of length {len}")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("short read: requested {requested} frames, source returned {returned}")]
    ShortRead { requested: usize, returned: usize },
}

/// An addressable, shape-queryable sequence of frames.
///
/// The pipeline reads frames by index range only and never mutates them.
/// Implementations may be backed by memory, files, or network sources;
/// retry policy for transient failures belongs to the implementation,
/// not to the pipeline.
pub trait ImageStackSource {
    /// Total shape of the stack.
    fn shape(&self) -> StackShape;

    /// Read a contiguous range of frames.
    ///
    /// Must return exactly `range.len()` frames of shape `(h, w)` or an error.
    fn read(&self, range: Range<usize>) -> Result<Vec<Frame>, StackError>;
}

/// An owned, fully materialized stack.
#[derive(Debug, Clone)]
pub struct InMemoryStack {
    frames: Vec<Frame>,
}

impl InMemoryStack {
    /// Build from frames, validating that all frames share one shape.
    pub fn from_frames(frames: Vec<Frame>) -> Result<Self, StackError> {
        let first = frames.first().ok_or(StackError::Empty)?;
        let (rows, cols) = (first.nrows(), first.ncols());
        for (index, frame) in frames.iter().enumerate() {
            if frame.nrows() != rows || frame.ncols() != cols {
                return Err(StackError::ShapeMismatch {
                    index,
                    rows: frame.nrows(),
                    cols: frame.ncols(),
                    expected_rows: rows,
                    expected_cols: cols,
                });
            }
        }
        Ok(Self { frames })
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl ImageStackSource for InMemoryStack {
    fn shape(&self) -> StackShape {
        StackShape {
            t: self.frames.len(),
            h: self.frames[0].nrows(),
            w: self.frames[0].ncols(),
        }
    }

    fn read(&self, range: Range<usize>) -> Result<Vec<Frame>, StackError> {
        if range.start > range.end || range.end > self.frames.len() {
            return Err(StackError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                len: self.frames.len(),
            });
        }
        Ok(self.frames[range].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(n: usize) -> InMemoryStack {
        let frames = (0..n).map(|i| Frame::from_element(4, 3, i as f32)).collect();
        InMemoryStack::from_frames(frames).unwrap()
    }

    #[test]
    fn shape_reports_all_axes() {
        let stack = stack_of(5);
        assert_eq!(stack.shape(), StackShape { t: 5, h: 4, w: 3 });
    }

    #[test]
    fn empty_stack_rejected() {
        assert!(matches!(
            InMemoryStack::from_frames(vec![]),
            Err(StackError::Empty)
        ));
    }

    #[test]
    fn mismatched_frame_rejected() {
        let frames = vec![Frame::zeros(4, 3), Frame::zeros(3, 4)];
        let err = InMemoryStack::from_frames(frames).unwrap_err();
        assert!(matches!(err, StackError::ShapeMismatch { index: 1, .. }));
    }

    #[test]
    fn range_read_returns_exact_window() {
        let stack = stack_of(6);
        let frames = stack.read(2..5).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0][(0, 0)], 2.0);
        assert_eq!(frames[2][(0, 0)], 4.0);
    }

    #[test]
    fn out_of_bounds_read_fails() {
        let stack = stack_of(6);
        assert!(matches!(
            stack.read(4..8),
            Err(StackError::RangeOutOfBounds { end: 8, len: 6, .. })
        ));
    }
}
