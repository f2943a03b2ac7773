//! Motion-correction pipeline for time-series image stacks.
//!
//! Frames of a recording drift against a common reference by rigid
//! translation and, optionally, spatially varying (piecewise-rigid)
//! deformation. This crate turns user parameters — physical units or pixels
//! — into a validated configuration, partitions the recording into temporal
//! chunks, iteratively estimates a reference template, drives the rigid and
//! piecewise-rigid registration passes, and aggregates the per-frame (and
//! per-patch) displacement history.
//!
//! The pixel-level registration itself is a pluggable capability
//! ([`stackreg_core::RegistrationEngine`]); this crate schedules and
//! configures calls to one.
//!
//! # Example
//!
//! ```no_run
//! use stackreg_core::InMemoryStack;
//! use stackreg_pipeline::{MotionCorrector, RegistrationParams, ShiftArchive};
//!
//! # fn run(stack: InMemoryStack) -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistrationParams {
//!     max_shifts: (6.0, 6.0),
//!     frames_per_split: 500,
//!     pw_rigid: true,
//!     ..RegistrationParams::default()
//! }
//! .validate((512, 512))?;
//!
//! let mut corrector = MotionCorrector::new(config);
//! let result = corrector.correct(&stack, false)?;
//! let archive = ShiftArchive::from_shifts(&result.shifts);
//! # Ok(())
//! # }
//! ```

/// Shift aggregation across out-of-order chunk completions.
pub mod aggregate;
/// Temporal chunk planning.
pub mod chunks;
/// Parameter translation and validated configuration.
pub mod config;
/// Physical-unit convenience wrapper.
pub mod correct_stack;
/// Pipeline error taxonomy.
pub mod error;
/// Shift-archive export.
pub mod export;
mod orchestrator;
mod piecewise;
mod preprocess;
mod rigid;
/// Per-frame shift records.
pub mod shifts;
mod template;

pub use chunks::{plan_chunks, resolve_split_count, Chunk};
pub use config::{
    ConfigError, PhysicalParams, PixelGeometry, RegistrationConfig, RegistrationParams,
    ScalarOrPair,
};
pub use correct_stack::{compute_shifts, StackShiftParams};
pub use error::CorrectionError;
pub use export::ShiftArchive;
pub use orchestrator::{
    CorrectionResult, MotionCorrector, PipelineStage, RegisteredOutput,
};
pub use shifts::{FrameShift, PatchField, PatchProvenance, PatchShift};
