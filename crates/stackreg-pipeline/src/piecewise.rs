//! Piecewise-rigid refinement.
//!
//! Runs only when `pw_rigid` is enabled, after rigid template estimation.
//! The field of view is tiled into overlapping patches once per pass; for
//! every frame the whole-frame rigid displacement is computed first, then
//! each patch is registered against the matching template patch with its
//! displacement constrained to within `max_deviation_rigid` of the rigid
//! estimate (one refinement pass per patch, no inner loop). A patch whose
//! content is too flat to correlate takes the clamped rigid fallback instead
//! of an unconstrained estimate; the record keeps that distinction.

use rayon::prelude::*;

use stackreg_core::engine::warp_by;
use stackreg_core::{
    EngineError, Frame, ImageStackSource, PatchGrid, RegistrationEngine, Shift, ShiftBounds,
};

use crate::aggregate::{ShiftAggregator, ShiftBatch};
use crate::chunks::Chunk;
use crate::config::RegistrationConfig;
use crate::error::CorrectionError;
use crate::preprocess::estimation_frame;
use crate::shifts::{FrameShift, PatchField, PatchProvenance, PatchShift};

/// A completed piecewise-rigid pass in global frame order.
pub(crate) struct PiecewisePass {
    pub shifts: Vec<FrameShift>,
    pub registered: Option<Vec<Frame>>,
    /// Mean corrected estimation frame over the pass.
    pub template: Frame,
}

struct PwChunkOutcome {
    start: usize,
    shifts: Vec<FrameShift>,
    registered: Option<Vec<Frame>>,
    est_sum: Frame,
    count: usize,
}

/// Register one frame's patches, constrained around its rigid displacement.
fn patch_field<E>(
    engine: &E,
    grid: &PatchGrid,
    est: &Frame,
    est_template: &Frame,
    rigid: Shift,
    max_deviation: f64,
) -> Result<PatchField, EngineError>
where
    E: RegistrationEngine,
{
    let (rows, cols) = grid.dims();
    let mut entries = Vec::with_capacity(grid.len());
    for window in grid.windows() {
        let patch = grid.extract(est, window);
        let template_patch = grid.extract(est_template, window);
        let bounds = ShiftBounds::around(rigid, max_deviation);
        match engine.register_patch(&patch, &template_patch, &bounds) {
            Ok(shift) => entries.push(PatchShift {
                shift,
                provenance: PatchProvenance::Refined,
            }),
            // Flat patch: fall back to the rigid displacement (which is, by
            // construction, the clamped center of the deviation bounds).
            Err(EngineError::DegenerateContent { .. }) => entries.push(PatchShift {
                shift: rigid,
                provenance: PatchProvenance::ClampedFallback,
            }),
            Err(err) => return Err(err),
        }
    }
    Ok(PatchField {
        rows,
        cols,
        entries,
    })
}

/// Composite a frame from its per-patch displacements: warp every patch by
/// its own shift and average where windows overlap.
fn composite(frame: &Frame, grid: &PatchGrid, field: &PatchField) -> Frame {
    let mut acc = Frame::zeros(frame.nrows(), frame.ncols());
    let mut weight = Frame::zeros(frame.nrows(), frame.ncols());
    for (window, patch_shift) in grid.windows().iter().zip(&field.entries) {
        let patch = grid.extract(frame, window);
        let warped = warp_by(&patch, patch_shift.shift);
        for x in 0..window.width {
            for y in 0..window.height {
                acc[(window.y0 + y, window.x0 + x)] += warped[(y, x)];
                weight[(window.y0 + y, window.x0 + x)] += 1.0;
            }
        }
    }
    acc.zip_map(&weight, |a, w| a / w)
}

fn register_chunk_piecewise<E, S>(
    engine: &E,
    config: &RegistrationConfig,
    source: &S,
    chunk: &Chunk,
    grid: &PatchGrid,
    est_template: &Frame,
    want_raw: bool,
    iteration: usize,
) -> Result<PwChunkOutcome, CorrectionError>
where
    E: RegistrationEngine,
    S: ImageStackSource,
{
    let params = config.params();
    let rigid_bounds = ShiftBounds::symmetric(params.max_shifts.0, params.max_shifts.1);

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
        let frame_index = chunk.start + offset;
        let est = estimation_frame(config, frame);

        // Rigid first: the patch deviation bound is relative to it.
        let (rigid, _) = engine
            .register(&est, est_template, &rigid_bounds)
            .map_err(|source| CorrectionError::Engine {
                chunk: chunk.index,
                frame: frame_index,
                iteration,
                source,
            })?;

        let field = patch_field(
            engine,
            grid,
            &est,
            est_template,
            rigid,
            params.max_deviation_rigid,
        )
        .map_err(|source| CorrectionError::Engine {
            chunk: chunk.index,
            frame: frame_index,
            iteration,
            source,
        })?;

        est_sum += composite(&est, grid, &field);
        if let Some(out) = registered.as_mut() {
            out.push(composite(frame, grid, &field));
        }
        shifts.push(FrameShift::PiecewiseRigid {
            rigid,
            patches: field,
        });
    }

    Ok(PwChunkOutcome {
        start: chunk.start,
        shifts,
        registered,
        est_sum,
        count: frames.len(),
    })
}

/// Run the piecewise-rigid pass over all chunks and restore frame order.
pub(crate) fn run_piecewise_pass<E, S>(
    engine: &E,
    config: &RegistrationConfig,
    source: &S,
    chunks: &[Chunk],
    est_template: &Frame,
    want_raw: bool,
    iteration: usize,
    total_frames: usize,
) -> Result<PiecewisePass, CorrectionError>
where
    E: RegistrationEngine,
    S: ImageStackSource + Sync,
{
    let (h, w) = config.fov();
    let params = config.params();
    // Geometry is content-independent: one grid per pass.
    let grid = PatchGrid::new(h, w, params.strides, params.overlaps);

    let mut outcomes: Vec<PwChunkOutcome> = chunks
        .par_iter()
        .map(|chunk| {
            register_chunk_piecewise(
                engine, config, source, chunk, &grid, est_template, want_raw, iteration,
            )
        })
        .collect::<Result<_, _>>()?;

    let mut est_total = Frame::zeros(h, w);
    let mut count = 0usize;
    for outcome in &outcomes {
        est_total += &outcome.est_sum;
        count += outcome.count;
    }
    let template = est_total / count as f32;

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

    Ok(PiecewisePass {
        shifts,
        registered,
        template,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunks::plan_chunks;
    use crate::config::RegistrationParams;
    use stackreg_core::{InMemoryStack, XCorrEngine};

    /// Frames with textured blocks in opposite corners, both displaced by
    /// the same offset per frame.
    fn blocky_stack(offsets: &[(usize, usize)]) -> InMemoryStack {
        let frames = offsets
            .iter()
            .map(|&(dy, dx)| {
                let mut frame = Frame::from_element(48, 40, 0.1);
                for &(cy, cx) in &[(8usize, 8usize), (32, 26)] {
                    for by in 0..5 {
                        for bx in 0..5 {
                            frame[(cy + dy + by, cx + dx + bx)] =
                                1.0 + (by * 5 + bx) as f32 * 0.04;
                        }
                    }
                }
                frame
            })
            .collect();
        InMemoryStack::from_frames(frames).unwrap()
    }

    fn pw_config() -> RegistrationConfig {
        RegistrationParams {
            max_shifts: (6.0, 6.0),
            max_deviation_rigid: 2.0,
            strides: (20, 16),
            overlaps: (6, 6),
            pw_rigid: true,
            frames_per_split: 2,
            ..RegistrationParams::default()
        }
        .validate((48, 40))
        .unwrap()
    }

    #[test]
    fn patch_shifts_respect_deviation_bound() {
        let stack = blocky_stack(&[(0, 0), (2, 1), (3, 2), (1, 0)]);
        let config = pw_config();
        let chunks = plan_chunks(4, 2);
        let engine = XCorrEngine::default();
        let template = estimation_frame(&config, &stack.frames()[0]);

        let pass =
            run_piecewise_pass(&engine, &config, &stack, &chunks, &template, false, 0, 4).unwrap();
        assert_eq!(pass.shifts.len(), 4);
        let dev = config.params().max_deviation_rigid + 1e-9;
        for shift in &pass.shifts {
            let rigid = shift.rigid();
            let field = shift.patches().expect("piecewise pass records patches");
            for patch in &field.entries {
                let (ddy, ddx) = patch.shift.abs_diff(&rigid);
                assert!(ddy <= dev, "dy deviation {ddy} exceeds bound");
                assert!(ddx <= dev, "dx deviation {ddx} exceeds bound");
            }
        }
    }

    #[test]
    fn flat_patches_take_the_rigid_fallback() {
        let stack = blocky_stack(&[(0, 0), (2, 1)]);
        let config = pw_config();
        let chunks = plan_chunks(2, 2);
        let engine = XCorrEngine::default();
        let template = estimation_frame(&config, &stack.frames()[0]);

        let pass =
            run_piecewise_pass(&engine, &config, &stack, &chunks, &template, false, 0, 2).unwrap();
        // The background-only windows carry no texture, so at least one
        // patch per frame must be a fallback, pinned exactly to the rigid
        // estimate.
        for shift in &pass.shifts {
            let rigid = shift.rigid();
            let field = shift.patches().unwrap();
            let fallbacks: Vec<&PatchShift> = field
                .entries
                .iter()
                .filter(|p| p.provenance == PatchProvenance::ClampedFallback)
                .collect();
            assert!(!fallbacks.is_empty());
            for patch in fallbacks {
                assert_eq!(patch.shift, rigid);
            }
        }
    }

    #[test]
    fn composite_undoes_uniform_displacement() {
        let stack = blocky_stack(&[(0, 0), (3, 2)]);
        let config = pw_config();
        let grid = PatchGrid::new(48, 40, (20, 16), (6, 6));
        let template = estimation_frame(&config, &stack.frames()[0]);
        let engine = XCorrEngine::default();

        let est = estimation_frame(&config, &stack.frames()[1]);
        let (rigid, _) = engine
            .register(
                &est,
                &template,
                &ShiftBounds::symmetric(6.0, 6.0),
            )
            .unwrap();
        let field = patch_field(&engine, &grid, &est, &template, rigid, 2.0).unwrap();
        let corrected = composite(&est, &grid, &field);
        // Block texture should land back on the template position.
        assert!((corrected[(10, 10)] - template[(10, 10)]).abs() < 0.3);
    }

    #[test]
    fn zero_deviation_pins_patches_to_rigid() {
        let stack = blocky_stack(&[(0, 0), (2, 2)]);
        let params = RegistrationParams {
            max_deviation_rigid: 0.0,
            ..pw_config().params().clone()
        };
        let config = params.validate((48, 40)).unwrap();
        let chunks = plan_chunks(2, 2);
        let engine = XCorrEngine::default();
        let template = estimation_frame(&config, &stack.frames()[0]);

        let pass =
            run_piecewise_pass(&engine, &config, &stack, &chunks, &template, false, 0, 2).unwrap();
        for shift in &pass.shifts {
            let rigid = shift.rigid();
            for patch in &shift.patches().unwrap().entries {
                assert_eq!(patch.shift, rigid, "deviation 0 forces the rigid shift");
            }
        }
    }
}
