//! Inspect and lightly reduce a FITS image from the command line
//!
//! # Usage
//!
//! ```bash
//! # Statistics of the whole primary image
//! cargo run --features fits --bin ccd_inspect -- frame.fits
//!
//! # A 40x40 box around (512, 480), asinh scaled, with 3-sigma outliers masked
//! cargo run --features fits --bin ccd_inspect -- frame.fits \
//!     --center 512,480,20 --scaling asinh --clip-sigma 3 --policy mask
//!
//! # Replace invalid pixels with the plane median and write back
//! cargo run --features fits --bin ccd_inspect -- frame.fits --clip-invalid --policy fullmedian --commit
//! ```

use anyhow::{bail, Context, Result};
use ccd::{
    CcdImage, DisplayRange, EngineConfig, FitsStore, ImageStore, RangeSpec, ReplacementPolicy,
    ScalingMode,
};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ccd_inspect",
    about = "Print statistics and display ranges for a region of a FITS image",
    long_about = None
)]
struct Args {
    /// FITS file to open
    path: PathBuf,

    /// Image plane (HDU holding a 2-D image, counted from 0)
    #[arg(long, default_value_t = 0)]
    plane: usize,

    /// Box to activate as x_low,x_high,y_low,y_high
    #[arg(long, conflicts_with = "center")]
    range: Option<String>,

    /// Square to activate as x_center,y_center,radius
    #[arg(long)]
    center: Option<String>,

    /// Scaling mode: linear, log, sb, exp, power or asinh
    #[arg(long, default_value = "linear")]
    scaling: ScalingMode,

    /// Clip pixels more than N standard deviations from the view mean
    #[arg(long)]
    clip_sigma: Option<f64>,

    /// Clip NaN and infinite pixels
    #[arg(long)]
    clip_invalid: bool,

    /// Replacement for clipped pixels: mask, median, mean, noclipmedian,
    /// noclipmean, fullmedian, fullmean or a number
    #[arg(long, default_value = "mask")]
    policy: ReplacementPolicy,

    /// Display range, e.g. p99, sigma3, n10, 0,1000
    #[arg(long, default_value = "p99", allow_hyphen_values = true)]
    display: DisplayRange,

    /// Write the edited view back to the file
    #[arg(long)]
    commit: bool,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn parse_ints(text: &str, expected: usize, what: &str) -> Result<Vec<i64>> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("{what} must be comma-separated integers, got '{text}'"))?;
    if values.len() != expected {
        bail!("{what} needs {expected} values, got {}", values.len());
    }
    Ok(values)
}

fn range_from_args(args: &Args) -> Result<RangeSpec> {
    if let Some(text) = &args.range {
        let v = parse_ints(text, 4, "--range")?;
        return Ok(RangeSpec::from_box(v[0], v[1], v[2], v[3]));
    }
    if let Some(text) = &args.center {
        let v = parse_ints(text, 3, "--center")?;
        return Ok(RangeSpec::centered(v[0], v[1], v[2]));
    }
    Ok(RangeSpec::Whole)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("reading engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.initial_plane = args.plane;

    let image = FitsStore
        .open(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    let mut ccd = CcdImage::with_config(image, config)?;

    println!(
        "{}: plane {} of {}, {}",
        args.path.display(),
        ccd.plane(),
        ccd.plane_count(),
        ccd.extent()
    );
    if let Some(zpt) = ccd.zero_point() {
        println!("  zero point: {zpt}");
    }
    if let Some((sx, sy)) = ccd.pixel_scale() {
        println!("  pixel scale: {sx} x {sy} arcsec/pixel");
    }
    println!("  global: {}", ccd.global_stats());

    ccd.activate(range_from_args(&args)?)?;
    ccd.set_scaling(args.scaling.clone())?;
    println!("  view {} ({}): {}", ccd.bounds(), ccd.scaling(), ccd.view_stats());

    if args.clip_invalid {
        let n = ccd.clip_invalid(args.policy)?;
        println!("  clipped {n} invalid pixel(s)");
    }
    if let Some(sigma) = args.clip_sigma {
        let n = ccd.clip_sigma(sigma, false, args.policy)?;
        println!("  clipped {n} pixel(s) beyond {sigma} sigma");
    }

    let (lo, hi) = ccd.display_range(&args.display)?;
    println!("  display range: [{lo:.6}, {hi:.6}]");

    if args.commit {
        ccd.commit()?;
        println!("  committed, global now: {}", ccd.global_stats());
    }

    ccd.close()?;
    Ok(())
}
