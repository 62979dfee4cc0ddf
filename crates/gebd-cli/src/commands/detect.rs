//! `gebd detect`
//!
//! Reads a clip from a safetensors file holding the tensors `mv`, `res`,
//! `motion`, `decode_order` and `frame_mask` (shapes as in [`ClipBatch`]),
//! runs the detector and prints per-frame boundary probabilities.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{Device, Tensor};
use clap::Args;
use serde::Serialize;
use tracing::{error, info};

use gebd_model::{
    BilinearMotionWarp, BoundaryError, BoundaryResult, BoundaryScores, ClipBatch,
    CompressedBoundaryModel, SafetensorsDirSink,
};

use super::resolve_config;

/// Arguments for `gebd detect`.
#[derive(Args)]
pub struct DetectArgs {
    /// Clip tensors in safetensors format
    #[arg(short, long)]
    pub input: PathBuf,

    /// TOML configuration (defaults when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model weights in safetensors format (random init when omitted)
    #[arg(short, long)]
    pub weights: Option<PathBuf>,

    /// Write every similarity map to this directory
    #[arg(long)]
    pub dump_similarity: Option<PathBuf>,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

/// Serializable detection result.
#[derive(Debug, Serialize)]
pub struct DetectReport {
    pub scores: Vec<Vec<f32>>,
    pub backbone_ms: f64,
    pub head_ms: f64,
}

impl DetectReport {
    pub fn from_scores(scores: &BoundaryScores) -> BoundaryResult<Self> {
        Ok(Self {
            scores: scores.to_rows()?,
            backbone_ms: scores.time_cost.backbone.as_secs_f64() * 1000.0,
            head_ms: scores.time_cost.head.as_secs_f64() * 1000.0,
        })
    }
}

/// Handle `gebd detect`.
pub fn handle_detect(args: DetectArgs) -> i32 {
    match run_detect(&args) {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
            } else {
                print!("{}", format_report(&report));
            }
            info!("Detection completed successfully");
            0
        }
        Err(e) => {
            error!("Detection failed: {}", e);
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn run_detect(args: &DetectArgs) -> BoundaryResult<DetectReport> {
    let config = resolve_config(args.config.as_deref())?;
    let device = config.device.device()?;

    let batch = load_clip(&args.input, &device)?;
    info!(
        videos = batch.num_videos(),
        frames = batch.num_frames(),
        input = %args.input.display(),
        "Loaded clip"
    );

    let mut model =
        CompressedBoundaryModel::new(config.model, Arc::new(BilinearMotionWarp::new()), &device)?;
    if let Some(weights) = &args.weights {
        model.load_weights(weights)?;
    }
    if let Some(dir) = &args.dump_similarity {
        model = model.with_similarity_sink(Arc::new(SafetensorsDirSink::new(dir)?));
    }

    let scores = model.detect(&batch)?;
    DetectReport::from_scores(&scores)
}

/// Read a [`ClipBatch`] from a safetensors file.
///
/// # Errors
/// `InvalidInput` when a tensor is missing; shape errors from
/// [`ClipBatch::validate`].
pub fn load_clip(path: &Path, device: &Device) -> BoundaryResult<ClipBatch> {
    let mut tensors = candle_core::safetensors::load(path, device)?;
    let mut take = |name: &str| -> BoundaryResult<Tensor> {
        tensors.remove(name).ok_or_else(|| {
            BoundaryError::invalid(format!(
                "clip file '{}' has no '{}' tensor",
                path.display(),
                name
            ))
        })
    };
    let batch = ClipBatch {
        mv: take("mv")?,
        res: take("res")?,
        motion: take("motion")?,
        decode_order: take("decode_order")?,
        frame_mask: take("frame_mask")?,
    };
    batch.validate()?;
    Ok(batch)
}

/// Format a detection report as human-readable text.
fn format_report(report: &DetectReport) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    let _ = writeln!(out, "Boundary Scores");
    let _ = writeln!(out, "===============\n");
    for (video, row) in report.scores.iter().enumerate() {
        let _ = writeln!(out, "Video {} ({} frames):", video, row.len());
        for (t, p) in row.iter().enumerate() {
            let bar = "#".repeat(((p * 20.0) as usize).min(20));
            let _ = writeln!(out, "  {:4} {:.3} |{:20}|", t, p, bar);
        }
        let _ = writeln!(out);
    }
    let _ = writeln!(
        out,
        "Time: backbone {:.2} ms, head {:.2} ms",
        report.backbone_ms, report.head_ms
    );
    out
}
