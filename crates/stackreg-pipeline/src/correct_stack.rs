//! Convenience entry point for rigid shift recovery with physical-unit
//! parameters.
//!
//! Wraps the full pipeline for the common case: the caller has an in-memory
//! stack, thinks in micrometers, and wants the per-frame rigid shift
//! profiles back. Piecewise-rigid refinement and movie materialization stay
//! off; use [`MotionCorrector`](crate::MotionCorrector) directly for full
//! control.

use stackreg_core::{ImageStackSource, Real};

use crate::config::{PhysicalParams, RegistrationParams, ScalarOrPair};
use crate::error::CorrectionError;
use crate::orchestrator::MotionCorrector;

/// Physical-unit parameters for [`compute_shifts`].
#[derive(Debug, Clone)]
pub struct StackShiftParams {
    /// Spatial resolution, um per pixel.
    pub pixel_size_um: ScalarOrPair,
    /// Maximum expected shift, um.
    pub max_shift_um: ScalarOrPair,
    /// Patch spacing used for the (unused, rigid-only) patch geometry, um.
    pub patch_motion_um: ScalarOrPair,
    /// Patch overlap, pixels.
    pub overlaps: (usize, usize),
    /// Allowed patch deviation from the rigid shift, pixels.
    pub max_deviation_rigid: Real,
    /// Temporal chunk length in frames.
    pub frames_per_split: usize,
    /// Known baseline value of the recording.
    pub min_mov: Real,
    /// Optional high-pass sigma for contaminated recordings.
    pub gsig_filt: Option<Real>,
}

impl Default for StackShiftParams {
    fn default() -> Self {
        Self {
            pixel_size_um: ScalarOrPair::Scalar(1.0),
            max_shift_um: ScalarOrPair::Pair(12.0, 12.0),
            patch_motion_um: ScalarOrPair::Pair(100.0, 100.0),
            overlaps: (24, 24),
            max_deviation_rigid: 3.0,
            frames_per_split: 200,
            min_mov: -5.0,
            gsig_filt: None,
        }
    }
}

/// Recover the rigid motion profiles of a stack.
///
/// Returns the per-frame `(dy, dx)` profiles as two sequences `(ys, xs)`,
/// each of length T.
pub fn compute_shifts<S>(
    source: &S,
    params: &StackShiftParams,
) -> Result<(Vec<Real>, Vec<Real>), CorrectionError>
where
    S: ImageStackSource + Sync,
{
    let shape = source.shape();
    let geometry = PhysicalParams {
        pixel_size_um: params.pixel_size_um,
        max_shift_um: params.max_shift_um,
        patch_size_um: params.patch_motion_um,
        overlaps: params.overlaps,
    }
    .translate()?;

    let config = RegistrationParams {
        max_shifts: geometry.max_shifts,
        strides: geometry.strides,
        overlaps: geometry.overlaps,
        max_deviation_rigid: params.max_deviation_rigid,
        frames_per_split: params.frames_per_split,
        min_mov: params.min_mov,
        gsig_filt: params.gsig_filt,
        pw_rigid: false,
        ..RegistrationParams::default()
    }
    .validate((shape.h, shape.w))?;

    let mut corrector = MotionCorrector::new(config);
    let result = corrector.correct(source, false)?;

    let mut ys = Vec::with_capacity(result.shifts.len());
    let mut xs = Vec::with_capacity(result.shifts.len());
    for shift in result.rigid_shifts() {
        ys.push(shift.dy);
        xs.push(shift.dx);
    }
    Ok((ys, xs))
}
