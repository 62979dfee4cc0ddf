//! `gebd targets`: preview Gaussian-smoothed boundary targets.

use clap::Args;
use serde::Serialize;
use tracing::error;

use gebd_model::training::gaussian_smooth;

/// Arguments for `gebd targets`.
#[derive(Args)]
pub struct TargetsArgs {
    /// Comma-separated 0/1 labels, one per frame (e.g. 0,0,1,0)
    #[arg(short, long)]
    pub labels: String,

    /// Gaussian standard deviation in frames
    #[arg(short, long, default_value = "1.0")]
    pub sigma: f32,

    /// Output as JSON instead of human-readable
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TargetsReport {
    sigma: f32,
    labels: Vec<u8>,
    targets: Vec<f32>,
}

/// Handle `gebd targets`.
pub fn handle_targets(args: TargetsArgs) -> i32 {
    if !(args.sigma.is_finite() && args.sigma > 0.0) {
        eprintln!("Error: --sigma must be > 0, got {}", args.sigma);
        return 1;
    }
    let labels = match parse_labels(&args.labels) {
        Ok(labels) => labels,
        Err(e) => {
            error!("Invalid labels: {}", e);
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let as_f32: Vec<f32> = labels.iter().map(|&l| f32::from(l)).collect();
    let report = TargetsReport {
        sigma: args.sigma,
        targets: gaussian_smooth(&as_f32, args.sigma),
        labels,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());
    } else {
        print!("{}", format_targets(&report));
    }
    0
}

/// Parse a comma-separated list of 0/1 labels.
fn parse_labels(raw: &str) -> Result<Vec<u8>, String> {
    let labels = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s {
            "0" => Ok(0u8),
            "1" => Ok(1u8),
            other => Err(format!("label must be 0 or 1, got '{}'", other)),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if labels.is_empty() {
        return Err("no labels given".to_string());
    }
    Ok(labels)
}

fn format_targets(report: &TargetsReport) -> String {
    use std::fmt::Write;
    let mut out = String::new();
    let _ = writeln!(out, "Targets (sigma = {})", report.sigma);
    for (t, (label, target)) in report.labels.iter().zip(&report.targets).enumerate() {
        let _ = writeln!(out, "  {:4} {} {:.4}", t, label, target);
    }
    out
}
