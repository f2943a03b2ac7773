//! Spatial high-pass filtering for recordings with strong background
//! contamination.
//!
//! Shift estimation on data with a slowly varying background locks onto the
//! background rather than the features of interest. Subtracting a Gaussian
//! blur leaves the high-frequency structure that correlation should track.
//! The filter is applied to estimation copies of frames and template only;
//! corrected output stays in the original intensity space.

use crate::math::Frame;

/// Subtract a Gaussian blur with the given sigma from the frame.
///
/// Sigma is in pixels; values at or below zero return the frame unchanged.
pub fn high_pass(frame: &Frame, sigma: f64) -> Frame {
    if sigma <= 0.0 {
        return frame.clone();
    }
    let blurred = gaussian_blur(frame, sigma);
    frame - blurred
}

/// Separable Gaussian blur with border-replicating sampling.
pub fn gaussian_blur(frame: &Frame, sigma: f64) -> Frame {
    let kernel = gaussian_kernel(sigma);
    let half = (kernel.len() / 2) as i64;
    let rows = frame.nrows() as i64;
    let cols = frame.ncols() as i64;

    let mut horizontal = Frame::zeros(frame.nrows(), frame.ncols());
    for x in 0..cols {
        for y in 0..rows {
            let mut acc = 0.0f64;
            for (k, &weight) in kernel.iter().enumerate() {
                let sx = (x + k as i64 - half).clamp(0, cols - 1);
                acc += weight * frame[(y as usize, sx as usize)] as f64;
            }
            horizontal[(y as usize, x as usize)] = acc as f32;
        }
    }

    let mut out = Frame::zeros(frame.nrows(), frame.ncols());
    for x in 0..cols {
        for y in 0..rows {
            let mut acc = 0.0f64;
            for (k, &weight) in kernel.iter().enumerate() {
                let sy = (y + k as i64 - half).clamp(0, rows - 1);
                acc += weight * horizontal[(sy as usize, x as usize)] as f64;
            }
            out[(y as usize, x as usize)] = acc as f32;
        }
    }
    out
}

/// Normalized 1D Gaussian kernel truncated at three sigma.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let half = (3.0 * sigma).ceil().max(1.0) as usize;
    let mut kernel = Vec::with_capacity(2 * half + 1);
    for i in 0..(2 * half + 1) {
        let d = i as f64 - half as f64;
        kernel.push((-d * d / (2.0 * sigma * sigma)).exp());
    }
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_pass_removes_constant_background() {
        let frame = Frame::from_element(16, 16, 5.0);
        let filtered = high_pass(&frame, 2.0);
        for v in filtered.iter() {
            assert!(v.abs() < 1e-4);
        }
    }

    #[test]
    fn high_pass_preserves_point_feature_contrast() {
        let mut frame = Frame::from_element(21, 21, 1.0);
        frame[(10, 10)] = 10.0;
        let filtered = high_pass(&frame, 1.5);
        // The impulse survives, the flat background vanishes.
        assert!(filtered[(10, 10)] > 5.0);
        assert!(filtered[(0, 0)].abs() < 0.1);
    }

    #[test]
    fn non_positive_sigma_is_identity() {
        let mut frame = Frame::zeros(8, 8);
        frame[(3, 4)] = 2.0;
        let filtered = high_pass(&frame, 0.0);
        assert_eq!(filtered, frame);
    }

    #[test]
    fn kernel_is_normalized() {
        let kernel = gaussian_kernel(1.3);
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
}
