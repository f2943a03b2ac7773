//! Whole-frame rigid correction.
//!
//! Every frame of every chunk is registered independently against the pass
//! template, producing one bounded displacement per frame. Chunks are
//! dispatched to rayon workers; each chunk's frames depend only on the
//! read-only template, so the pass is embarrassingly parallel. Output order
//! is restored to global frame order by the aggregator regardless of chunk
//! completion order.

use rayon::prelude::*;

use stackreg_core::engine::warp_by;
use stackreg_core::{Frame, ImageStackSource, RegistrationEngine, Shift, ShiftBounds};

use crate::aggregate::{ShiftAggregator, ShiftBatch};
use crate::chunks::Chunk;
use crate::config::RegistrationConfig;
use crate::error::CorrectionError;
use crate::preprocess::estimation_frame;

/// Per-chunk result of a rigid registration sweep.
pub(crate) struct ChunkOutcome {
    pub start: usize,
    pub shifts: Vec<Shift>,
    /// Corrected raw frames, collected only when the pass materializes
    /// output.
    pub registered: Option<Vec<Frame>>,
    /// Sum of corrected estimation-space frames, for template averaging.
    pub est_sum: Frame,
    pub count: usize,
}

/// Register every frame of `chunk` against `est_template`.
pub(crate) fn register_chunk<E, S>(
    engine: &E,
    config: &RegistrationConfig,
    source: &S,
    chunk: &Chunk,
    est_template: &Frame,
    want_raw: bool,
    iteration: usize,
) -> Result<ChunkOutcome, CorrectionError>
where
    E: RegistrationEngine,
    S: ImageStackSource,
{
    let params = config.params();
    let bounds = ShiftBounds::symmetric(params.max_shifts.0, params.max_shifts.1);

    let frames = source
        .read(chunk.range())
        .map_err(|source| CorrectionError::Read {
            chunk: chunk.index,
            start: chunk.start,
            end: chunk.end,
            source,
        })?;

    let (h, w) = config.fov();
    let mut est_sum = Frame::zeros(h, w);
    let mut shifts = Vec::with_capacity(frames.len());
    let mut registered = want_raw.then(|| Vec::with_capacity(frames.len()));

    for (offset, frame) in frames.iter().enumerate() {
        let est = estimation_frame(config, frame);
        let (shift, registered_est) =
            engine
                .register(&est, est_template, &bounds)
                .map_err(|source| CorrectionError::Engine {
                    chunk: chunk.index,
                    frame: chunk.start + offset,
                    iteration,
                    source,
                })?;
        est_sum += &registered_est;
        shifts.push(shift);
        if let Some(out) = registered.as_mut() {
            out.push(warp_by(frame, shift));
        }
    }

    Ok(ChunkOutcome {
        start: chunk.start,
        shifts,
        registered,
        est_sum,
        count: frames.len(),
    })
}

/// Register a set of chunks in parallel.
pub(crate) fn register_chunks<E, S>(
    engine: &E,
    config: &RegistrationConfig,
    source: &S,
    chunks: &[Chunk],
    est_template: &Frame,
    want_raw: bool,
    iteration: usize,
) -> Result<Vec<ChunkOutcome>, CorrectionError>
where
    E: RegistrationEngine,
    S: ImageStackSource + Sync,
{
    chunks
        .par_iter()
        .map(|chunk| {
            register_chunk(engine, config, source, chunk, est_template, want_raw, iteration)
        })
        .collect()
}

/// Mean of the corrected estimation frames across outcomes: the candidate
/// template for the next iteration.
pub(crate) fn mean_template(outcomes: &[ChunkOutcome]) -> Frame {
    let mut total = outcomes[0].est_sum.clone();
    let mut count = outcomes[0].count;
    for outcome in &outcomes[1..] {
        total += &outcome.est_sum;
        count += outcome.count;
    }
    total / count as f32
}

/// A completed full rigid pass in global frame order.
pub(crate) struct RigidPass {
    pub shifts: Vec<Shift>,
    pub registered: Option<Vec<Frame>>,
    /// Mean corrected estimation frame: the pass's template update.
    pub template: Frame,
}

/// Run a full rigid pass over all chunks and restore frame order.
pub(crate) fn run_rigid_pass<E, S>(
    engine: &E,
    config: &RegistrationConfig,
    source: &S,
    chunks: &[Chunk],
    est_template: &Frame,
    want_raw: bool,
    iteration: usize,
    total_frames: usize,
) -> Result<RigidPass, CorrectionError>
where
    E: RegistrationEngine,
    S: ImageStackSource + Sync,
{
    let mut outcomes =
        register_chunks(engine, config, source, chunks, est_template, want_raw, iteration)?;
    let template = mean_template(&outcomes);

    let mut shift_agg = ShiftAggregator::new();
    let mut frame_agg = want_raw.then(ShiftAggregator::<Frame>::new);
    for outcome in outcomes.drain(..) {
        if let (Some(agg), Some(frames)) = (frame_agg.as_mut(), outcome.registered) {
            agg.push(ShiftBatch {
                start: outcome.start,
                values: frames,
            });
        }
        shift_agg.push(ShiftBatch {
            start: outcome.start,
            values: outcome.shifts,
        });
    }

    let shifts = shift_agg.into_ordered(total_frames)?;
    let registered = match frame_agg {
        Some(agg) => Some(agg.into_ordered(total_frames)?),
        None => None,
    };

    Ok(RigidPass {
        shifts,
        registered,
        template,
    })
}
