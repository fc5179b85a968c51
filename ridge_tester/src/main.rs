use anyhow::{Context, Result, bail};
use clap::Parser;
use image::GrayImage;
use ridge_vision::batch_pipeline::{AnalysisJob, BatchAnalyzer, BatchConfig};
use ridge_vision::core_modules::block_grid::BackgroundMask;
use ridge_vision::core_modules::utils::image_helper::image_helper;
use ridge_vision::pipeline::{AnalysisConfig, BlockGrid, DamageAnalysisInput, Segment, estimate_base_field};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Runs damage segmentation and field correction over fingerprint images.
///
/// For every IMAGE, `<stem>.quality.png` (one pixel per block, gray / 255 =
/// quality) must exist next to it; `<stem>.mask.png` (one pixel per block,
/// black = background) is optional.
#[derive(Parser, Debug)]
#[command(name = "ridge_tester", version)]
struct Args {
    /// JSON analysis config; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Block side in pixels
    #[arg(short, long, default_value_t = 16)]
    block_size: u32,

    /// Directory for the preview images
    #[arg(short, long, default_value = "ridge_out")]
    out_dir: PathBuf,

    /// Images processed concurrently (defaults to the number of CPUs)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Input images
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let analysis = match &args.config {
        Some(path) => AnalysisConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let mut batch_config = BatchConfig {
        analysis: analysis.clone(),
        ..BatchConfig::default()
    };
    if let Some(jobs) = args.jobs {
        batch_config.max_concurrent_images = jobs;
    }
    let batch = BatchAnalyzer::new(batch_config)?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output directory {}", args.out_dir.display()))?;

    let mut jobs = Vec::with_capacity(args.images.len());
    let mut sources = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let (job, image) = load_job(path, args.block_size, &analysis)?;
        jobs.push(job);
        sources.push(image);
    }

    info!(images = jobs.len(), block_size = args.block_size, "analyzing");
    let outcomes = batch.analyze_all(jobs).await;

    let mut failures = 0;
    for (outcome, image) in outcomes.into_iter().zip(&sources) {
        let report = match outcome.result {
            Ok(report) => report,
            Err(e) => {
                error!(image = %outcome.name, "analysis failed: {e}");
                failures += 1;
                continue;
            }
        };

        let write = |suffix: &str, preview: &GrayImage| -> Result<()> {
            let path = args.out_dir.join(format!("{}.{suffix}.png", outcome.name));
            image_helper::save(&path, preview).with_context(|| format!("writing {}", path.display()))
        };
        write("areas", &image_helper::render_labels(&report.labels, args.block_size))?;
        write("singularities", &image_helper::render_singularities(&report.singularities, args.block_size))?;
        write("orientation", &image_helper::render_orientation(image, &report.corrected_field))?;

        println!(
            "{}: {} areas ({} singular), {} blocks corrected, {} bank fields, {} growth passes",
            outcome.name,
            report.areas.len(),
            report.singularity_area_count(),
            report.correction.corrected_blocks,
            report.bank.len(),
            report.growth_passes,
        );
    }

    if failures > 0 {
        bail!("{failures} of {} images failed", sources.len());
    }
    Ok(())
}

/// Reads an image and its collaborator maps and builds its analysis job.
fn load_job(path: &Path, block_size: u32, config: &AnalysisConfig) -> Result<(AnalysisJob, GrayImage)> {
    let image = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_luma8();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();

    let orientation = estimate_base_field(&image, block_size, config)?;
    let (cols, rows) = orientation.shape();

    let mask_path = sibling(path, &stem, "mask");
    let background: BackgroundMask = if mask_path.exists() {
        let mask_image = image::open(&mask_path)
            .with_context(|| format!("opening {}", mask_path.display()))?
            .to_luma8();
        image_helper::mask_from_gray(&mask_image)
    } else {
        BlockGrid::filled(cols, rows, Segment::Foreground)
    };

    let quality_path = sibling(path, &stem, "quality");
    let quality_image = image::open(&quality_path)
        .with_context(|| format!("opening {}", quality_path.display()))?
        .to_luma8();
    let quality = image_helper::quality_from_gray(&quality_image, &background)
        .with_context(|| format!("{} does not match the mask", quality_path.display()))?;

    let job = AnalysisJob {
        name: stem,
        input: DamageAnalysisInput {
            image: image.clone(),
            block_size,
            background,
            quality,
            orientation,
        },
    };
    Ok((job, image))
}

fn sibling(path: &Path, stem: &str, kind: &str) -> PathBuf {
    path.with_file_name(format!("{stem}.{kind}.png"))
}
