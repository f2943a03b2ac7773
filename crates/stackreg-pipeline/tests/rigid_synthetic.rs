//! End-to-end rigid correction on a synthetic drifting recording.
//!
//! A 500-frame stack with two bright spots drifting linearly along y is
//! corrected with physical-unit parameters. The recovered shift profile
//! must track the known ground truth closely on the moving axis and stay
//! flat on the motionless one, even though the true drift exceeds the
//! configured search bound near the end of the recording.

use stackreg_core::diagnostics::{max_abs_deviation_from_mean, pearson};
use stackreg_core::synthetic::{drifting_spots_stack, DriftingSpots};
use stackreg_pipeline::{compute_shifts, ScalarOrPair, StackShiftParams};

#[test]
fn recovers_linear_drift_profile() {
    let (stack, truth) = drifting_spots_stack(&DriftingSpots {
        h: 30,
        w: 20,
        t: 500,
        spot: (5, 5),
        offsets: vec![(1, 1), (10, 4)],
        max_drift: (10.0, 0.0),
        noise_std: 0.5,
        seed: 42,
    })
    .unwrap();

    let params = StackShiftParams {
        pixel_size_um: ScalarOrPair::Scalar(1.0),
        max_shift_um: ScalarOrPair::Scalar(6.0),
        frames_per_split: 125, // 4 chunks of 125 frames
        ..StackShiftParams::default()
    };
    let (ys, xs) = compute_shifts(&stack, &params).unwrap();
    assert_eq!(ys.len(), 500);
    assert_eq!(xs.len(), 500);

    let truth_y: Vec<f64> = truth.iter().map(|s| s.dy).collect();
    let corr = pearson(&truth_y, &ys).expect("profiles are non-constant");
    assert!(
        corr > 0.95,
        "recovered y profile correlates poorly with ground truth: {corr}"
    );

    // No motion along x: the recovered profile must be flat. (Correlation
    // against a constant truth is undefined, so flatness is asserted
    // directly.)
    assert!(
        max_abs_deviation_from_mean(&xs) <= 1.5,
        "motionless axis drifted"
    );
}

#[test]
fn recovered_shifts_stay_inside_search_bound() {
    let (stack, _) = drifting_spots_stack(&DriftingSpots {
        t: 120,
        max_drift: (10.0, 0.0),
        ..DriftingSpots::default()
    })
    .unwrap();

    let params = StackShiftParams {
        pixel_size_um: ScalarOrPair::Scalar(1.0),
        max_shift_um: ScalarOrPair::Scalar(6.0),
        frames_per_split: 30,
        ..StackShiftParams::default()
    };
    let (ys, xs) = compute_shifts(&stack, &params).unwrap();
    for (dy, dx) in ys.iter().zip(&xs) {
        assert!(dy.abs() <= 6.0 + 1e-9);
        assert!(dx.abs() <= 6.0 + 1e-9);
    }
}
