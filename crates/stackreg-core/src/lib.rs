//! Core primitives for `stackreg`.
//!
//! This crate contains:
//! - scalar and frame type aliases (`Real`, `Frame`, [`Shift`]),
//! - the dataset-source seam ([`ImageStackSource`], [`InMemoryStack`]),
//! - the registration-engine seam ([`RegistrationEngine`]) and a bounded
//!   cross-correlation default implementation ([`XCorrEngine`]),
//! - overlapping patch-grid geometry for piecewise-rigid correction,
//! - a spatial high-pass filter for contaminated recordings,
//! - synthetic drifting-spot stacks for tests and demos.
//!
//! Orchestration (chunking, template estimation, the rigid/piecewise
//! correction passes) lives in `stackreg-pipeline`; this crate only provides
//! the pieces those passes are built from.

/// Pearson correlation and shift-profile comparison helpers.
pub mod diagnostics;
/// Registration-engine trait and the default cross-correlation engine.
pub mod engine;
/// Spatial high-pass filtering.
pub mod filter;
/// Scalar, frame, and displacement types.
pub mod math;
/// Overlapping patch-grid geometry.
pub mod patches;
/// Dataset-source trait and in-memory stacks.
pub mod stack;
/// Synthetic test-stack generation.
pub mod synthetic;

pub use engine::{EngineError, RegistrationEngine, ShiftBounds, XCorrEngine};
pub use math::{Frame, Real, Shift};
pub use patches::{PatchGrid, PatchWindow};
pub use stack::{ImageStackSource, InMemoryStack, StackError, StackShape};
