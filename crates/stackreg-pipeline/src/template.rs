//! Iterative template estimation.
//!
//! The reference template is refined over `niter_rig` iterations. All but
//! the last are sketch iterations: a deterministic, evenly spaced sample of
//! chunks is registered against the current template and the corrected
//! frames are averaged into the next one. Sampling trades registration
//! completeness for more template updates inside a fixed compute budget; the
//! final iteration is always a full pass and is driven by the orchestrator
//! so its shifts become the run's output.
//!
//! The template is replaced, never mutated, at each iteration boundary:
//! iteration k+1 reads exactly the frame iteration k produced, and all
//! chunks of an iteration complete before the replacement happens.

use stackreg_core::{Frame, ImageStackSource, RegistrationEngine};

use crate::chunks::{resolve_split_count, sample_chunks, Chunk};
use crate::config::RegistrationConfig;
use crate::error::CorrectionError;
use crate::preprocess::estimation_frame;
use crate::rigid::{mean_template, register_chunks};

/// Initial template when the caller supplies no seed: the mean of the first
/// chunk's frames, in estimation space.
pub(crate) fn initial_template<S>(
    config: &RegistrationConfig,
    source: &S,
    first_chunk: &Chunk,
) -> Result<Frame, CorrectionError>
where
    S: ImageStackSource,
{
    let frames = source
        .read(first_chunk.range())
        .map_err(|source| CorrectionError::Read {
            chunk: first_chunk.index,
            start: first_chunk.start,
            end: first_chunk.end,
            source,
        })?;
    let (h, w) = config.fov();
    let mut sum = Frame::zeros(h, w);
    for frame in &frames {
        sum += estimation_frame(config, frame);
    }
    Ok(sum / frames.len() as f32)
}

/// Run the sketch iterations (all template-update iterations except the
/// final full pass), returning the refined template.
pub(crate) fn refine_template<E, S>(
    engine: &E,
    config: &RegistrationConfig,
    source: &S,
    chunks: &[Chunk],
    mut template: Frame,
) -> Result<Frame, CorrectionError>
where
    E: RegistrationEngine,
    S: ImageStackSource + Sync,
{
    let params = config.params();
    let sketch_iterations = params.niter_rig - 1;
    let count = resolve_split_count(params.num_splits_to_process_rig, chunks.len());

    for iteration in 0..sketch_iterations {
        let sampled = sample_chunks(chunks, count);
        log::debug!(
            "template iteration {}/{}: sampling {} of {} chunks",
            iteration + 1,
            sketch_iterations,
            sampled.len(),
            chunks.len()
        );
        let outcomes =
            register_chunks(engine, config, source, &sampled, &template, false, iteration)?;
        // Iteration barrier: the candidate replaces the template only after
        // every sampled chunk has been registered against the old one.
        template = mean_template(&outcomes);
    }
    Ok(template)
}
