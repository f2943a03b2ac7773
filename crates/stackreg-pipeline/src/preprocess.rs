//! Estimation-space preprocessing.
//!
//! Shift estimation runs on a preprocessed copy of every frame: the known
//! baseline (`min_mov`) is subtracted and, when configured, a spatial
//! high-pass is applied. Templates are averaged in the same space so engine
//! inputs stay comparable across iterations. Corrected output frames are
//! produced from the raw data; preprocessing never leaks into results.

use stackreg_core::filter::high_pass;
use stackreg_core::Frame;

use crate::config::RegistrationConfig;

/// Map a raw frame into estimation space.
pub(crate) fn estimation_frame(config: &RegistrationConfig, frame: &Frame) -> Frame {
    let params = config.params();
    let mut est = frame.clone();
    if params.min_mov != 0.0 {
        est.add_scalar_mut(-(params.min_mov as f32));
    }
    match params.gsig_filt {
        Some(sigma) => high_pass(&est, sigma),
        None => est,
    }
}
