use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use stackreg_core::synthetic::{drifting_spots_stack, DriftingSpots};
use stackreg_core::{Frame, ImageStackSource, InMemoryStack};
use stackreg_pipeline::{
    MotionCorrector, RegistrationParams, ShiftArchive,
};

/// Motion correction for time-series image stacks.
#[derive(Debug, Parser)]
#[command(author, version, about = "Rigid and piecewise-rigid motion correction")]
struct Args {
    /// Path to a JSON stack: {"frames": [[[row], ...], ...]}.
    /// Mutually exclusive with --synthetic.
    #[arg(long)]
    input: Option<String>,

    /// Run on a generated drifting-spots stack instead of an input file.
    #[arg(long)]
    synthetic: bool,

    /// Number of frames for the synthetic stack.
    #[arg(long, default_value_t = 300)]
    synthetic_frames: usize,

    /// Optional path to JSON RegistrationParams. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Where to write the shift archive JSON; stdout when omitted.
    #[arg(long)]
    out_shifts: Option<String>,

    /// Materialize the registered stack (reported, not persisted).
    #[arg(long)]
    save_movie: bool,
}

/// JSON-described input stack.
#[derive(Debug, Serialize, Deserialize)]
struct StackInput {
    frames: Vec<Vec<Vec<f32>>>,
}

impl StackInput {
    fn into_stack(self) -> Result<InMemoryStack> {
        let mut frames = Vec::with_capacity(self.frames.len());
        for (index, rows) in self.frames.into_iter().enumerate() {
            let h = rows.len();
            let w = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|r| r.len() != w) {
                bail!("frame {index} has ragged rows");
            }
            let mut frame = Frame::zeros(h, w);
            for (y, row) in rows.into_iter().enumerate() {
                for (x, v) in row.into_iter().enumerate() {
                    frame[(y, x)] = v;
                }
            }
            frames.push(frame);
        }
        InMemoryStack::from_frames(frames).context("input frames do not form a stack")
    }
}

/// Run summary printed to stdout alongside (or instead of) the archive.
#[derive(Debug, Serialize, Deserialize)]
struct CorrectionReport {
    frames: usize,
    fov: (usize, usize),
    chunks: usize,
    pw_rigid: bool,
    movie_materialized: bool,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn load_stack(args: &Args) -> Result<InMemoryStack> {
    match (&args.input, args.synthetic) {
        (Some(_), true) => bail!("--input and --synthetic are mutually exclusive"),
        (Some(path), false) => {
            let input: StackInput = load_json_file(Path::new(path))?;
            input.into_stack()
        }
        (None, true) => {
            let (stack, _) = drifting_spots_stack(&DriftingSpots {
                t: args.synthetic_frames,
                ..DriftingSpots::default()
            })?;
            Ok(stack)
        }
        (None, false) => bail!("either --input or --synthetic is required"),
    }
}

fn run(args: &Args) -> Result<(CorrectionReport, ShiftArchive)> {
    let stack = load_stack(args)?;
    let shape = stack.shape();
    log::info!("loaded stack {shape}");

    let params = match &args.config {
        Some(path) => load_json_file::<RegistrationParams>(Path::new(path))?,
        None => RegistrationParams::default(),
    };
    let pw_rigid = params.pw_rigid;
    let frames_per_split = params.frames_per_split;
    let config = params
        .validate((shape.h, shape.w))
        .context("invalid registration configuration")?;

    let mut corrector = MotionCorrector::new(config);
    let result = corrector.correct(&stack, args.save_movie)?;

    let report = CorrectionReport {
        frames: shape.t,
        fov: (shape.h, shape.w),
        chunks: shape.t.div_ceil(frames_per_split),
        pw_rigid,
        movie_materialized: result.registered.frames().is_some(),
    };
    Ok((report, ShiftArchive::from_shifts(&result.shifts)))
}

fn main() {
    env_logger::init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let (report, archive) = run(&args)?;

    match &args.out_shifts {
        Some(path) => {
            fs::write(path, serde_json::to_string_pretty(&archive)?)
                .with_context(|| format!("writing {path}"))?;
            log::info!("shift archive written to {path}");
        }
        None => println!("{}", serde_json::to_string_pretty(&archive)?),
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
