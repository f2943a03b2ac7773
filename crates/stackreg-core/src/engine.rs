//! Registration-engine seam and the default cross-correlation engine.
//!
//! The pipeline consumes registration as an opaque capability: given a frame
//! (or patch), a template (or template patch), and admissible displacement
//! bounds, the engine returns a bounded displacement estimate. [`XCorrEngine`]
//! implements this with an exhaustive normalized cross-correlation search over
//! the integer shifts inside the bounds, followed by parabolic subpixel
//! interpolation quantized to the engine's upsampling grid.
//!
//! Engines must be deterministic for identical inputs; the template-update
//! protocol in the pipeline relies on reproducible estimates.

use thiserror::Error;

use crate::math::{Frame, Real, Shift};

/// Errors raised by registration engines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("frame shape {frame_rows}x{frame_cols} does not match template shape {template_rows}x{template_cols}")]
    ShapeMismatch {
        frame_rows: usize,
        frame_cols: usize,
        template_rows: usize,
        template_cols: usize,
    },
    /// Content too flat to correlate. The piecewise corrector treats this as
    /// a recoverable condition (clamped rigid fallback); everywhere else it
    /// is fatal.
    #[error("content is too flat to register (correlation variance {variance:.3e})")]
    DegenerateContent { variance: Real },
    #[error("no admissible overlap between frame and template inside the shift bounds")]
    NoAdmissibleShift,
    #[error("estimated displacement is not finite")]
    NonFiniteShift,
}

/// Inclusive per-axis displacement bounds handed to an engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShiftBounds {
    pub min_dy: Real,
    pub max_dy: Real,
    pub min_dx: Real,
    pub max_dx: Real,
}

impl ShiftBounds {
    /// Symmetric bounds `|dy| <= max_dy`, `|dx| <= max_dx`.
    pub fn symmetric(max_dy: Real, max_dx: Real) -> Self {
        Self {
            min_dy: -max_dy,
            max_dy,
            min_dx: -max_dx,
            max_dx,
        }
    }

    /// Bounds centered on `center` with radius `radius` along both axes.
    pub fn around(center: Shift, radius: Real) -> Self {
        Self {
            min_dy: center.dy - radius,
            max_dy: center.dy + radius,
            min_dx: center.dx - radius,
            max_dx: center.dx + radius,
        }
    }

    /// Clamp a shift into the bounds, inclusive at both ends.
    pub fn clamp(&self, shift: Shift) -> Shift {
        Shift {
            dy: shift.dy.clamp(self.min_dy, self.max_dy),
            dx: shift.dx.clamp(self.min_dx, self.max_dx),
        }
    }

    fn integer_candidates(range_min: Real, range_max: Real) -> std::ops::RangeInclusive<i64> {
        let lo = range_min.ceil() as i64;
        let hi = range_max.floor() as i64;
        if lo > hi {
            // Bounds narrower than one pixel: evaluate the rounded midpoint.
            let mid = ((range_min + range_max) / 2.0).round() as i64;
            mid..=mid
        } else {
            lo..=hi
        }
    }

    fn dy_candidates(&self) -> std::ops::RangeInclusive<i64> {
        Self::integer_candidates(self.min_dy, self.max_dy)
    }

    fn dx_candidates(&self) -> std::ops::RangeInclusive<i64> {
        Self::integer_candidates(self.min_dx, self.max_dx)
    }
}

/// Rigid and patch registration against a fixed template.
///
/// Both estimates are bounded: the returned displacement always lies inside
/// the given [`ShiftBounds`] (the engine clamps, callers propagate).
pub trait RegistrationEngine: Sync {
    /// Estimate the whole-frame displacement of `frame` relative to
    /// `template` and return it together with the corrected frame.
    fn register(
        &self,
        frame: &Frame,
        template: &Frame,
        bounds: &ShiftBounds,
    ) -> Result<(Shift, Frame), EngineError>;

    /// Estimate the displacement of a single patch relative to the matching
    /// template patch. No corrected patch is produced; the caller owns
    /// compositing.
    fn register_patch(
        &self,
        patch: &Frame,
        template_patch: &Frame,
        bounds: &ShiftBounds,
    ) -> Result<Shift, EngineError>;
}

/// Exhaustive bounded cross-correlation with subpixel refinement.
///
/// Scores every integer shift inside the bounds with zero-normalized
/// cross-correlation over the overlap region, then refines the peak with a
/// separable parabolic fit quantized to `1 / upsample_factor` pixel steps.
#[derive(Debug, Clone)]
pub struct XCorrEngine {
    /// Subpixel grid density: estimates are quantized to `1 / upsample_factor`.
    pub upsample_factor: usize,
    /// Minimum overlap area, as a fraction of the template area, for a
    /// candidate shift to be scored.
    pub min_overlap_fraction: Real,
}

impl Default for XCorrEngine {
    fn default() -> Self {
        Self {
            upsample_factor: 4,
            min_overlap_fraction: 1.0 / 8.0,
        }
    }
}

impl XCorrEngine {
    pub fn with_upsample_factor(upsample_factor: usize) -> Self {
        Self {
            upsample_factor: upsample_factor.max(1),
            ..Self::default()
        }
    }

    fn overlap_region(
        &self,
        frame: &Frame,
        template: &Frame,
        dy: i64,
        dx: i64,
    ) -> Option<(i64, i64, i64, i64)> {
        let rows = template.nrows() as i64;
        let cols = template.ncols() as i64;
        // Template pixel (y, x) is compared against frame pixel (y+dy, x+dx).
        let y0 = 0.max(-dy);
        let y1 = rows.min(frame.nrows() as i64 - dy);
        let x0 = 0.max(-dx);
        let x1 = cols.min(frame.ncols() as i64 - dx);
        if y1 <= y0 || x1 <= x0 {
            return None;
        }
        let area = ((y1 - y0) * (x1 - x0)) as Real;
        let floor = self.min_overlap_fraction * (rows * cols) as Real;
        if area < floor.max(1.0) {
            return None;
        }
        Some((y0, y1, x0, x1))
    }

    fn overlap_is_adequate(&self, frame: &Frame, template: &Frame, dy: i64, dx: i64) -> bool {
        self.overlap_region(frame, template, dy, dx).is_some()
    }

    /// ZNCC between `template` and `frame` displaced by `(dy, dx)`, over the
    /// overlap region. `None` when the overlap is below the area floor or the
    /// content in the overlap is flat on either side.
    fn zncc_at(&self, frame: &Frame, template: &Frame, dy: i64, dx: i64) -> Option<Real> {
        let (y0, y1, x0, x1) = self.overlap_region(frame, template, dy, dx)?;
        let area = ((y1 - y0) * (x1 - x0)) as Real;

        let mut sum_t = 0.0f64;
        let mut sum_f = 0.0f64;
        let mut sum_tt = 0.0f64;
        let mut sum_ff = 0.0f64;
        let mut sum_tf = 0.0f64;
        for x in x0..x1 {
            for y in y0..y1 {
                let t = template[(y as usize, x as usize)] as f64;
                let v = frame[((y + dy) as usize, (x + dx) as usize)] as f64;
                sum_t += t;
                sum_f += v;
                sum_tt += t * t;
                sum_ff += v * v;
                sum_tf += t * v;
            }
        }

        let var_t = sum_tt - sum_t * sum_t / area;
        let var_f = sum_ff - sum_f * sum_f / area;
        if var_t <= 1e-8 || var_f <= 1e-8 {
            return None;
        }
        let cov = sum_tf - sum_t * sum_f / area;
        Some(cov / (var_t * var_f).sqrt())
    }

    /// Integer-grid peak search plus subpixel refinement.
    fn estimate(
        &self,
        frame: &Frame,
        template: &Frame,
        bounds: &ShiftBounds,
    ) -> Result<Shift, EngineError> {
        if frame.nrows() != template.nrows() || frame.ncols() != template.ncols() {
            return Err(EngineError::ShapeMismatch {
                frame_rows: frame.nrows(),
                frame_cols: frame.ncols(),
                template_rows: template.nrows(),
                template_cols: template.ncols(),
            });
        }

        let mut best: Option<(i64, i64, Real)> = None;
        let mut had_overlap = false;
        for dy in bounds.dy_candidates() {
            for dx in bounds.dx_candidates() {
                had_overlap |= self.overlap_is_adequate(frame, template, dy, dx);
                if let Some(score) = self.zncc_at(frame, template, dy, dx) {
                    if best.map_or(true, |(_, _, b)| score > b) {
                        best = Some((dy, dx, score));
                    }
                }
            }
        }

        let (peak_dy, peak_dx, peak_score) = match best {
            Some(peak) => peak,
            None if had_overlap => {
                // Candidates overlapped but nothing correlated: flat content.
                // The centered variance gives the error a useful number.
                let variance = centered_variance(frame);
                return Err(EngineError::DegenerateContent { variance });
            }
            None => return Err(EngineError::NoAdmissibleShift),
        };

        let refine = |minus: Option<Real>, center: Real, plus: Option<Real>| -> Real {
            match (minus, plus) {
                (Some(a), Some(b)) => {
                    let denom = a - 2.0 * center + b;
                    if denom >= -1e-12 {
                        0.0
                    } else {
                        ((a - b) / (2.0 * denom)).clamp(-0.5, 0.5)
                    }
                }
                _ => 0.0,
            }
        };

        let up = self.upsample_factor.max(1) as Real;
        let quantize = |delta: Real| (delta * up).round() / up;

        let sub_dy = quantize(refine(
            self.zncc_at(frame, template, peak_dy - 1, peak_dx),
            peak_score,
            self.zncc_at(frame, template, peak_dy + 1, peak_dx),
        ));
        let sub_dx = quantize(refine(
            self.zncc_at(frame, template, peak_dy, peak_dx - 1),
            peak_score,
            self.zncc_at(frame, template, peak_dy, peak_dx + 1),
        ));

        let shift = bounds.clamp(Shift::new(
            peak_dy as Real + sub_dy,
            peak_dx as Real + sub_dx,
        ));
        if !shift.is_finite() {
            return Err(EngineError::NonFiniteShift);
        }
        Ok(shift)
    }
}

impl RegistrationEngine for XCorrEngine {
    fn register(
        &self,
        frame: &Frame,
        template: &Frame,
        bounds: &ShiftBounds,
    ) -> Result<(Shift, Frame), EngineError> {
        let shift = self.estimate(frame, template, bounds)?;
        let registered = warp_by(frame, shift);
        Ok((shift, registered))
    }

    fn register_patch(
        &self,
        patch: &Frame,
        template_patch: &Frame,
        bounds: &ShiftBounds,
    ) -> Result<Shift, EngineError> {
        self.estimate(patch, template_patch, bounds)
    }
}

/// Resample `frame` at `+shift` with bilinear interpolation, undoing the
/// displacement the shift describes. Samples outside the frame clamp to the
/// border.
pub fn warp_by(frame: &Frame, shift: Shift) -> Frame {
    let rows = frame.nrows();
    let cols = frame.ncols();
    let mut out = Frame::zeros(rows, cols);
    for x in 0..cols {
        for y in 0..rows {
            let sy = (y as Real + shift.dy).clamp(0.0, (rows - 1) as Real);
            let sx = (x as Real + shift.dx).clamp(0.0, (cols - 1) as Real);
            let y0 = sy.floor() as usize;
            let x0 = sx.floor() as usize;
            let y1 = (y0 + 1).min(rows - 1);
            let x1 = (x0 + 1).min(cols - 1);
            let fy = (sy - y0 as Real) as f32;
            let fx = (sx - x0 as Real) as f32;
            let top = frame[(y0, x0)] * (1.0 - fx) + frame[(y0, x1)] * fx;
            let bottom = frame[(y1, x0)] * (1.0 - fx) + frame[(y1, x1)] * fx;
            out[(y, x)] = top * (1.0 - fy) + bottom * fy;
        }
    }
    out
}

fn centered_variance(frame: &Frame) -> Real {
    let n = (frame.nrows() * frame.ncols()) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for v in frame.iter() {
        let v = *v as f64;
        sum += v;
        sum_sq += v * v;
    }
    (sum_sq - sum * sum / n) / n
}
