//! End-to-end correction runs.
//!
//! [`MotionCorrector`] owns a validated configuration, a registration
//! engine, and (after a run) the fitted template. One call to
//! [`MotionCorrector::correct`] walks the pipeline stages strictly forward:
//!
//! `Configured → Chunked → TemplateEstimating → RigidCorrecting →
//! (PatchCorrecting) → Aggregated → Done`
//!
//! `PatchCorrecting` is skipped when piecewise-rigid refinement is disabled.
//! A fresh run for new data starts at `Configured` again, optionally seeded
//! with the template a previous run produced.

use stackreg_core::{
    Frame, ImageStackSource, Real, RegistrationEngine, Shift, XCorrEngine,
};

use crate::chunks::{plan_chunks, resolve_split_count};
use crate::config::RegistrationConfig;
use crate::error::CorrectionError;
use crate::preprocess::estimation_frame;
use crate::shifts::FrameShift;
use crate::{piecewise, rigid, template};

/// Pipeline progress marker. Transitions are strictly forward within one
/// run; no stage is ever re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Configured,
    Chunked,
    TemplateEstimating,
    RigidCorrecting,
    PatchCorrecting,
    Aggregated,
    Done,
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug_assert!(next > *stage, "pipeline stage may only move forward");
    log::debug!("pipeline stage {:?} -> {:?}", stage, next);
    *stage = next;
}

/// Where (and whether) the fully registered stack was materialized.
#[derive(Debug, Clone)]
pub enum RegisteredOutput {
    /// `save_movie` was off; only shifts and the template were produced.
    None,
    /// The corrected stack, in frame order.
    InMemory(Vec<Frame>),
}

impl RegisteredOutput {
    pub fn frames(&self) -> Option<&[Frame]> {
        match self {
            RegisteredOutput::None => None,
            RegisteredOutput::InMemory(frames) => Some(frames),
        }
    }
}

/// Everything a finished run yields.
#[derive(Debug, Clone)]
pub struct CorrectionResult {
    /// The converged reference template (estimation space).
    pub template: Frame,
    /// One record per frame, in frame order.
    pub shifts: Vec<FrameShift>,
    /// Registered-output descriptor.
    pub registered: RegisteredOutput,
}

impl CorrectionResult {
    /// Rigid `(dy, dx)` per frame.
    pub fn rigid_shifts(&self) -> Vec<Shift> {
        self.shifts.iter().map(FrameShift::rigid).collect()
    }

    /// Per-frame per-patch x displacements, when piecewise-rigid ran.
    pub fn x_shifts_els(&self) -> Option<Vec<Vec<Real>>> {
        self.shifts
            .iter()
            .map(|s| s.patches().map(|p| p.dxs()))
            .collect()
    }

    /// Per-frame per-patch y displacements, when piecewise-rigid ran.
    pub fn y_shifts_els(&self) -> Option<Vec<Vec<Real>>> {
        self.shifts
            .iter()
            .map(|s| s.patches().map(|p| p.dys()))
            .collect()
    }
}

/// The fitted corrector: configuration, engine, and (after a run) template.
///
/// Reusable: correcting a second stack registers it against the template the
/// first run converged to.
pub struct MotionCorrector<E = XCorrEngine> {
    config: RegistrationConfig,
    engine: E,
    template: Option<Frame>,
}

impl MotionCorrector<XCorrEngine> {
    /// Build with the default cross-correlation engine, configured with the
    /// config's subpixel upsampling factor.
    pub fn new(config: RegistrationConfig) -> Self {
        let engine = XCorrEngine::with_upsample_factor(config.params().upsample_factor_grid);
        Self::with_engine(config, engine)
    }
}

impl<E: RegistrationEngine> MotionCorrector<E> {
    /// Build with a caller-supplied registration engine.
    pub fn with_engine(config: RegistrationConfig, engine: E) -> Self {
        Self {
            config,
            engine,
            template: None,
        }
    }

    /// Seed the run with a previously fitted template (raw intensity space).
    pub fn with_template(mut self, template: Frame) -> Self {
        self.template = Some(template);
        self
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// The fitted template, present after a successful run (or seeding).
    pub fn template(&self) -> Option<&Frame> {
        self.template.as_ref()
    }

    /// Run the full correction pipeline over `source`.
    ///
    /// `save_movie` materializes the registered stack in the result and
    /// forces the final iteration into full-pass mode (the final pass
    /// registers every chunk in any case, so shift output always covers the
    /// whole recording).
    pub fn correct<S>(
        &mut self,
        source: &S,
        save_movie: bool,
    ) -> Result<CorrectionResult, CorrectionError>
    where
        S: ImageStackSource + Sync,
    {
        let mut stage = PipelineStage::Configured;
        let shape = source.shape();
        self.config.check_fov(shape.h, shape.w)?;
        if shape.t == 0 {
            return Err(CorrectionError::EmptyStack);
        }
        let params = self.config.params().clone();

        advance(&mut stage, PipelineStage::Chunked);
        let chunks = plan_chunks(shape.t, params.frames_per_split);
        let rig_samples = resolve_split_count(params.num_splits_to_process_rig, chunks.len());
        log::info!(
            "correcting {} frames in {} chunks (sampling {} per rigid template iteration)",
            shape.t,
            chunks.len(),
            rig_samples,
        );

        advance(&mut stage, PipelineStage::TemplateEstimating);
        // A failed run must leave any previously fitted template intact, so
        // the seed is read without consuming it.
        let seed = match self.template.as_ref() {
            Some(seed) => estimation_frame(&self.config, seed),
            None => template::initial_template(&self.config, source, &chunks[0])?,
        };
        let mut est_template =
            template::refine_template(&self.engine, &self.config, source, &chunks, seed)?;

        advance(&mut stage, PipelineStage::RigidCorrecting);
        // Final rigid iteration: always a full pass so every frame gets a
        // shift record; materializes output only when this is the terminal
        // stage.
        let rigid_is_terminal = !params.pw_rigid;
        let final_rigid_iteration = params.niter_rig - 1;
        let rigid_pass = rigid::run_rigid_pass(
            &self.engine,
            &self.config,
            source,
            &chunks,
            &est_template,
            save_movie && rigid_is_terminal,
            final_rigid_iteration,
            shape.t,
        )?;
        est_template = rigid_pass.template;

        let (shifts, registered_frames, final_template) = if params.pw_rigid {
            advance(&mut stage, PipelineStage::PatchCorrecting);
            let pw_pass = piecewise::run_piecewise_pass(
                &self.engine,
                &self.config,
                source,
                &chunks,
                &est_template,
                save_movie,
                params.niter_rig,
                shape.t,
            )?;
            (pw_pass.shifts, pw_pass.registered, pw_pass.template)
        } else {
            let shifts = rigid_pass.shifts.into_iter().map(FrameShift::Rigid).collect();
            (shifts, rigid_pass.registered, est_template)
        };

        advance(&mut stage, PipelineStage::Aggregated);
        let registered = match registered_frames {
            Some(frames) => RegisteredOutput::InMemory(frames),
            None => RegisteredOutput::None,
        };

        self.template = Some(final_template.clone());
        advance(&mut stage, PipelineStage::Done);
        log::info!("correction finished: {} shift records", shifts.len());

        Ok(CorrectionResult {
            template: final_template,
            shifts,
            registered,
        })
    }
}
