//! Synthetic drifting-spot stacks with known ground-truth motion.
//!
//! The generated stacks mirror the recordings the corrector targets: a noisy
//! background with a few bright textured spots that drift linearly over the
//! recording. Ground-truth per-frame shifts are returned alongside the stack
//! so tests can score recovered motion against the truth.

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::math::{Frame, Real, Shift};
use crate::stack::{InMemoryStack, StackError};

/// Parameters for [`drifting_spots_stack`].
#[derive(Debug, Clone)]
pub struct DriftingSpots {
    /// Frame height (rows).
    pub h: usize,
    /// Frame width (columns).
    pub w: usize,
    /// Number of frames.
    pub t: usize,
    /// Spot height and width in pixels.
    pub spot: (usize, usize),
    /// Top-left corners of the spots at zero drift, `(y, x)`.
    pub offsets: Vec<(usize, usize)>,
    /// Maximum drift reached on the last frame, `(dy, dx)`; the drift ramps
    /// linearly from zero and is rounded to whole pixels per frame.
    pub max_drift: (Real, Real),
    /// Standard deviation of the uniform background / gaussian spot noise.
    pub noise_std: Real,
    /// RNG seed; identical seeds give identical stacks.
    pub seed: u64,
}

impl Default for DriftingSpots {
    fn default() -> Self {
        Self {
            h: 30,
            w: 20,
            t: 500,
            spot: (5, 5),
            offsets: vec![(1, 1), (10, 4)],
            max_drift: (10.0, 0.0),
            noise_std: 0.5,
            seed: 42,
        }
    }
}

/// Generate a noisy stack with bright spots drifting linearly, returning the
/// stack and the per-frame ground-truth shifts.
pub fn drifting_spots_stack(params: &DriftingSpots) -> Result<(InMemoryStack, Vec<Shift>), StackError> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let std = params.noise_std.max(1e-6) as f32;
    let background = Uniform::new(0.0f32, std);
    let spot_noise = Uniform::new(1.0 - std, 1.0 + std);

    let truth: Vec<Shift> = (0..params.t)
        .map(|i| {
            let fraction = if params.t > 1 {
                i as Real / (params.t - 1) as Real
            } else {
                0.0
            };
            Shift::new(
                (params.max_drift.0 * fraction).round(),
                (params.max_drift.1 * fraction).round(),
            )
        })
        .collect();

    let mut frames = Vec::with_capacity(params.t);
    for shift in &truth {
        let mut frame = Frame::zeros(params.h, params.w);
        for v in frame.iter_mut() {
            *v = background.sample(&mut rng);
        }
        for &(oy, ox) in &params.offsets {
            let y_start = oy + shift.dy as usize;
            let x_start = ox + shift.dx as usize;
            for y in y_start..(y_start + params.spot.0).min(params.h) {
                for x in x_start..(x_start + params.spot.1).min(params.w) {
                    frame[(y, x)] = spot_noise.sample(&mut rng);
                }
            }
        }
        frames.push(frame);
    }

    Ok((InMemoryStack::from_frames(frames)?, truth))
}
