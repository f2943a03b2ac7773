//! Pipeline error taxonomy.
//!
//! Configuration problems surface before any registration work; engine and
//! read failures are fatal for the run and carry enough context (chunk,
//! frame, iteration) to reproduce the failing unit of work in isolation.

use thiserror::Error;

use stackreg_core::{EngineError, StackError};

use crate::config::ConfigError;

/// Errors surfaced by a correction run.
#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The registration engine failed for one frame or patch. A missing
    /// shift would break the frame-order invariant of the shift record, so
    /// the run aborts rather than skipping the frame.
    #[error("registration failed on frame {frame} (chunk {chunk}, iteration {iteration}): {source}")]
    Engine {
        chunk: usize,
        frame: usize,
        iteration: usize,
        source: EngineError,
    },

    /// A dataset range read failed. Not retried here; retry policy belongs
    /// to the dataset source.
    #[error("failed to read frames [{start}, {end}) for chunk {chunk}: {source}")]
    Read {
        chunk: usize,
        start: usize,
        end: usize,
        source: StackError,
    },

    /// Chunk results did not reassemble into one record per frame.
    #[error("aggregated {got} shift records, expected {expected}")]
    IncompleteShiftRecord { expected: usize, got: usize },

    #[error("stack contains no frames")]
    EmptyStack,
}
