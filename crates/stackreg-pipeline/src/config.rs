//! Registration configuration: physical-unit translation, pixel-unit
//! parameters, and eager geometric validation.
//!
//! Configuration is constructed once and validated at construction, before
//! any registration work begins; a validated [`RegistrationConfig`] is
//! immutable for the lifetime of a correction run. A new pass means a new
//! config.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stackreg_core::Real;

/// Configuration errors, raised eagerly at translation/validation time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("patch window of {window_px}px (strides + overlaps) must be smaller than the {fov_px}px field of view along the {axis} axis")]
    PatchExceedsFov {
        axis: &'static str,
        window_px: usize,
        fov_px: usize,
    },
    #[error("niter_rig must be at least 1, got {0}")]
    NonPositiveIterations(usize),
    #[error("frames_per_split must be at least 1")]
    NonPositiveChunkSize,
    #[error("pixel size must be positive, got {0}")]
    NonPositivePixelSize(Real),
    #[error("max_shifts must be positive along both axes, got ({0}, {1})")]
    NonPositiveMaxShifts(Real, Real),
    #[error("upsample_factor_grid must be at least 1")]
    NonPositiveUpsample,
    #[error("strides must be positive along both axes, got ({0}, {1})")]
    NonPositiveStrides(usize, usize),
    #[error("max_deviation_rigid must be non-negative, got {0}")]
    NegativeDeviation(Real),
    #[error("num_splits_to_process_{which} must be at least 1 when set")]
    ZeroSplitSampling { which: &'static str },
    #[error("field of view must be non-empty, got {h}x{w}")]
    EmptyFov { h: usize, w: usize },
    #[error("stack field of view {actual_h}x{actual_w} does not match the configured {h}x{w}")]
    FovMismatch {
        h: usize,
        w: usize,
        actual_h: usize,
        actual_w: usize,
    },
}

/// A physical quantity given either as one value for both axes or as an
/// explicit `(y, x)` pair. Scalars broadcast identically to the equivalent
/// pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarOrPair {
    Scalar(Real),
    Pair(Real, Real),
}

impl ScalarOrPair {
    /// Resolve to an explicit `(y, x)` pair.
    pub fn resolve(&self) -> (Real, Real) {
        match *self {
            ScalarOrPair::Scalar(v) => (v, v),
            ScalarOrPair::Pair(y, x) => (y, x),
        }
    }
}

impl From<Real> for ScalarOrPair {
    fn from(v: Real) -> Self {
        ScalarOrPair::Scalar(v)
    }
}

impl From<(Real, Real)> for ScalarOrPair {
    fn from((y, x): (Real, Real)) -> Self {
        ScalarOrPair::Pair(y, x)
    }
}

/// Physical-unit inputs: the user reasons in micrometers, the pipeline in
/// pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalParams {
    /// Spatial resolution in um per pixel, per axis.
    pub pixel_size_um: ScalarOrPair,
    /// Maximum expected rigid shift in um.
    pub max_shift_um: ScalarOrPair,
    /// Spacing of the piecewise-rigid patch tiling in um (becomes `strides`).
    pub patch_size_um: ScalarOrPair,
    /// Patch overlap in pixels.
    pub overlaps: (usize, usize),
}

/// Pixel-unit geometry produced from [`PhysicalParams`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PixelGeometry {
    pub max_shifts: (Real, Real),
    pub strides: (usize, usize),
    pub overlaps: (usize, usize),
}

impl PhysicalParams {
    /// Convert physical quantities to pixel units by elementwise division,
    /// truncating toward zero.
    pub fn translate(&self) -> Result<PixelGeometry, ConfigError> {
        let (py, px) = self.pixel_size_um.resolve();
        if py <= 0.0 || px <= 0.0 {
            return Err(ConfigError::NonPositivePixelSize(py.min(px)));
        }
        let (my, mx) = self.max_shift_um.resolve();
        let (sy, sx) = self.patch_size_um.resolve();
        Ok(PixelGeometry {
            max_shifts: ((my / py).trunc(), (mx / px).trunc()),
            strides: ((sy / py).trunc() as usize, (sx / px).trunc() as usize),
            overlaps: self.overlaps,
        })
    }

    /// Translate and merge with defaults for everything the physical inputs
    /// do not cover.
    pub fn to_params(&self) -> Result<RegistrationParams, ConfigError> {
        let geometry = self.translate()?;
        Ok(RegistrationParams {
            max_shifts: geometry.max_shifts,
            strides: geometry.strides,
            overlaps: geometry.overlaps,
            ..RegistrationParams::default()
        })
    }
}

/// Unvalidated pixel-unit registration parameters.
///
/// This is the full recognized-option surface. Validate against a concrete
/// field of view with [`RegistrationParams::validate`] to obtain a
/// [`RegistrationConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    /// Rigid search bound per axis, `(dy, dx)`, pixels.
    pub max_shifts: (Real, Real),
    /// Allowed deviation of a patch displacement from the frame's rigid
    /// displacement, per axis, pixels.
    pub max_deviation_rigid: Real,
    /// Patch tiling step, `(y, x)`, pixels.
    pub strides: (usize, usize),
    /// Patch overlap, `(y, x)`, pixels. Patch windows measure
    /// `strides + overlaps`.
    pub overlaps: (usize, usize),
    /// Subpixel refinement factor for patch registration.
    pub upsample_factor_grid: usize,
    /// Number of template-update iterations for rigid registration.
    pub niter_rig: usize,
    /// Temporal chunk length in frames.
    pub frames_per_split: usize,
    /// How many chunks each rigid template-update iteration samples;
    /// `None` means every chunk. Saturates at the chunk count.
    pub num_splits_to_process_rig: Option<usize>,
    /// Sampling breadth for piecewise-rigid template iterations; `None`
    /// means every chunk. Saturates at the chunk count.
    pub num_splits_to_process_els: Option<usize>,
    /// Enable piecewise-rigid refinement after rigid correction.
    pub pw_rigid: bool,
    /// Sigma (pixels) of the spatial high-pass applied to estimation copies;
    /// `None` disables filtering.
    pub gsig_filt: Option<Real>,
    /// Known baseline value of the recording, subtracted before registration.
    pub min_mov: Real,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            max_shifts: (6.0, 6.0),
            max_deviation_rigid: 3.0,
            strides: (30, 30),
            overlaps: (10, 10),
            upsample_factor_grid: 4,
            niter_rig: 4,
            frames_per_split: 1000,
            num_splits_to_process_rig: None,
            num_splits_to_process_els: None,
            pw_rigid: false,
            gsig_filt: None,
            min_mov: 0.0,
        }
    }
}

impl RegistrationParams {
    /// Validate against the field of view `(h, w)`.
    ///
    /// All geometric constraints are checked here, before any frame is read;
    /// violations surface as [`ConfigError`] and are never silently
    /// corrected.
    pub fn validate(self, fov: (usize, usize)) -> Result<RegistrationConfig, ConfigError> {
        let (h, w) = fov;
        if h == 0 || w == 0 {
            return Err(ConfigError::EmptyFov { h, w });
        }
        if self.niter_rig < 1 {
            return Err(ConfigError::NonPositiveIterations(self.niter_rig));
        }
        if self.frames_per_split < 1 {
            return Err(ConfigError::NonPositiveChunkSize);
        }
        if self.upsample_factor_grid < 1 {
            return Err(ConfigError::NonPositiveUpsample);
        }
        if self.max_shifts.0 <= 0.0 || self.max_shifts.1 <= 0.0 {
            return Err(ConfigError::NonPositiveMaxShifts(
                self.max_shifts.0,
                self.max_shifts.1,
            ));
        }
        if self.max_deviation_rigid < 0.0 {
            return Err(ConfigError::NegativeDeviation(self.max_deviation_rigid));
        }
        if self.num_splits_to_process_rig == Some(0) {
            return Err(ConfigError::ZeroSplitSampling { which: "rig" });
        }
        if self.num_splits_to_process_els == Some(0) {
            return Err(ConfigError::ZeroSplitSampling { which: "els" });
        }
        if self.pw_rigid {
            if self.strides.0 == 0 || self.strides.1 == 0 {
                return Err(ConfigError::NonPositiveStrides(
                    self.strides.0,
                    self.strides.1,
                ));
            }
            let window = (
                self.strides.0 + self.overlaps.0,
                self.strides.1 + self.overlaps.1,
            );
            if window.0 >= h {
                return Err(ConfigError::PatchExceedsFov {
                    axis: "y",
                    window_px: window.0,
                    fov_px: h,
                });
            }
            if window.1 >= w {
                return Err(ConfigError::PatchExceedsFov {
                    axis: "x",
                    window_px: window.1,
                    fov_px: w,
                });
            }
        }
        Ok(RegistrationConfig { params: self, fov })
    }
}

/// A validated, immutable registration configuration bound to one field of
/// view.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationConfig {
    params: RegistrationParams,
    fov: (usize, usize),
}

impl RegistrationConfig {
    /// The validated parameter set.
    pub fn params(&self) -> &RegistrationParams {
        &self.params
    }

    /// Field of view `(h, w)` this configuration was validated against.
    pub fn fov(&self) -> (usize, usize) {
        self.fov
    }

    /// Reject a stack whose spatial shape differs from the validated one.
    pub fn check_fov(&self, h: usize, w: usize) -> Result<(), ConfigError> {
        if (h, w) != self.fov {
            return Err(ConfigError::FovMismatch {
                h: self.fov.0,
                w: self.fov.1,
                actual_h: h,
                actual_w: w,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_pair_broadcast_identically() {
        let scalar = PhysicalParams {
            pixel_size_um: 2.0.into(),
            max_shift_um: 12.0.into(),
            patch_size_um: 50.0.into(),
            overlaps: (10, 10),
        };
        let pair = PhysicalParams {
            pixel_size_um: (2.0, 2.0).into(),
            max_shift_um: (12.0, 12.0).into(),
            patch_size_um: (50.0, 50.0).into(),
            overlaps: (10, 10),
        };
        assert_eq!(scalar.translate().unwrap(), pair.translate().unwrap());
    }

    #[test]
    fn translation_truncates_toward_zero() {
        let params = PhysicalParams {
            pixel_size_um: (2.0, 3.0).into(),
            max_shift_um: (13.0, 13.0).into(),
            patch_size_um: (100.0, 100.0).into(),
            overlaps: (24, 24),
        };
        let geometry = params.translate().unwrap();
        assert_eq!(geometry.max_shifts, (6.0, 4.0)); // 13/2 -> 6, 13/3 -> 4
        assert_eq!(geometry.strides, (50, 33));
    }

    #[test]
    fn non_positive_pixel_size_rejected() {
        let params = PhysicalParams {
            pixel_size_um: 0.0.into(),
            max_shift_um: 12.0.into(),
            patch_size_um: 50.0.into(),
            overlaps: (10, 10),
        };
        assert!(matches!(
            params.translate(),
            Err(ConfigError::NonPositivePixelSize(_))
        ));
    }

    #[test]
    fn patch_geometry_validated_only_when_piecewise() {
        let params = RegistrationParams {
            strides: (30, 30),
            overlaps: (10, 10),
            pw_rigid: false,
            ..RegistrationParams::default()
        };
        // 40px window on a 32px FOV: fine while rigid-only.
        assert!(params.clone().validate((32, 32)).is_ok());

        let params = RegistrationParams {
            pw_rigid: true,
            ..params
        };
        let err = params.validate((32, 32)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PatchExceedsFov {
                axis: "y",
                window_px: 40,
                fov_px: 32
            }
        ));
    }

    #[test]
    fn window_equal_to_fov_is_rejected() {
        let params = RegistrationParams {
            strides: (24, 24),
            overlaps: (8, 8),
            pw_rigid: true,
            ..RegistrationParams::default()
        };
        assert!(params.validate((32, 48)).is_err());
    }

    #[test]
    fn zero_iterations_rejected() {
        let params = RegistrationParams {
            niter_rig: 0,
            ..RegistrationParams::default()
        };
        assert!(matches!(
            params.validate((64, 64)),
            Err(ConfigError::NonPositiveIterations(0))
        ));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let params = RegistrationParams {
            frames_per_split: 0,
            ..RegistrationParams::default()
        };
        assert!(matches!(
            params.validate((64, 64)),
            Err(ConfigError::NonPositiveChunkSize)
        ));
    }

    #[test]
    fn zero_split_sampling_rejected() {
        let params = RegistrationParams {
            num_splits_to_process_rig: Some(0),
            ..RegistrationParams::default()
        };
        assert!(matches!(
            params.validate((64, 64)),
            Err(ConfigError::ZeroSplitSampling { which: "rig" })
        ));
    }

    #[test]
    fn fov_mismatch_detected() {
        let config = RegistrationParams::default().validate((30, 20)).unwrap();
        assert!(config.check_fov(30, 20).is_ok());
        assert!(matches!(
            config.check_fov(20, 30),
            Err(ConfigError::FovMismatch { .. })
        ));
    }

    #[test]
    fn params_json_roundtrip() {
        let params = RegistrationParams {
            max_shifts: (6.0, 4.0),
            pw_rigid: true,
            gsig_filt: Some(2.0),
            num_splits_to_process_rig: Some(5),
            ..RegistrationParams::default()
        };
        let json = serde_json::to_string_pretty(&params).unwrap();
        let de: RegistrationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(de.max_shifts, params.max_shifts);
        assert_eq!(de.pw_rigid, params.pw_rigid);
        assert_eq!(de.gsig_filt, params.gsig_filt);
        assert_eq!(de.num_splits_to_process_rig, Some(5));
    }

    #[test]
    fn scalar_or_pair_json_forms() {
        let scalar: ScalarOrPair = serde_json::from_str("2.5").unwrap();
        assert_eq!(scalar.resolve(), (2.5, 2.5));
        let pair: ScalarOrPair = serde_json::from_str("[2.0, 3.0]").unwrap();
        assert_eq!(pair.resolve(), (2.0, 3.0));
    }
}
