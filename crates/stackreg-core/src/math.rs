//! Scalar, frame, and displacement types used throughout the library.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Scalar type used for displacements and statistics (currently `f64`).
pub type Real = f64;

/// A single (H, W) image grid. Rows index y, columns index x.
pub type Frame = DMatrix<f32>;

/// A 2D translation in pixels, `(dy, dx)`, subpixel-valued.
///
/// The convention throughout the library: a frame whose content sits at
/// `(y0 + dy, x0 + dx)` where the template has it at `(y0, x0)` carries the
/// shift `(dy, dx)`. Correcting the frame means resampling it at `+shift`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Shift {
    /// Displacement along the row (y) axis.
    pub dy: Real,
    /// Displacement along the column (x) axis.
    pub dx: Real,
}

impl Shift {
    /// Zero displacement.
    pub const ZERO: Self = Self { dy: 0.0, dx: 0.0 };

    pub fn new(dy: Real, dx: Real) -> Self {
        Self { dy, dx }
    }

    /// Componentwise absolute difference to another shift.
    pub fn abs_diff(&self, other: &Shift) -> (Real, Real) {
        ((self.dy - other.dy).abs(), (self.dx - other.dx).abs())
    }

    /// True when both components are finite.
    pub fn is_finite(&self) -> bool {
        self.dy.is_finite() && self.dx.is_finite()
    }
}

impl std::fmt::Display for Shift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(dy={:.3}, dx={:.3})", self.dy, self.dx)
    }
}

/// Mean of a non-empty slice of equally shaped frames.
///
/// Panics on an empty slice; callers guarantee at least one frame.
pub fn mean_frame(frames: &[Frame]) -> Frame {
    assert!(!frames.is_empty(), "mean of zero frames");
    let mut acc = frames[0].clone();
    for frame in &frames[1..] {
        acc += frame;
    }
    acc / frames.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_abs_diff() {
        let a = Shift::new(2.0, -1.0);
        let b = Shift::new(-0.5, 1.5);
        assert_eq!(a.abs_diff(&b), (2.5, 2.5));
    }

    #[test]
    fn shift_finiteness() {
        assert!(Shift::new(0.25, -3.0).is_finite());
        assert!(!Shift::new(Real::NAN, 0.0).is_finite());
        assert!(!Shift::new(0.0, Real::INFINITY).is_finite());
    }

    #[test]
    fn mean_of_frames() {
        let a = Frame::from_element(2, 2, 1.0);
        let b = Frame::from_element(2, 2, 3.0);
        let m = mean_frame(&[a, b]);
        assert_eq!(m[(0, 0)], 2.0);
        assert_eq!(m[(1, 1)], 2.0);
    }
}
