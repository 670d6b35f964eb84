//! Batch command - concurrent extraction over many documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use idp_core::{ExtractionPipeline, ExtractionRun};

use super::extract::{format_run, OutputFormat};
use super::{build_pipeline, load_config};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of concurrent extractions
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// Continue on error
    #[arg(long)]
    continue_on_error: bool,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

/// Outcome of one file.
struct FileResult {
    path: PathBuf,
    run: Option<ExtractionRun>,
    error: Option<String>,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(model_dir) = &args.model_dir {
        config.ocr.model_dir = model_dir.clone();
    }

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            matches!(
                ext.to_lowercase().as_str(),
                "pdf" | "png" | "jpg" | "jpeg" | "tif" | "tiff" | "bmp"
            )
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let pipeline = Arc::new(build_pipeline(config)?);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let semaphore = Arc::new(Semaphore::new(args.jobs.max(1)));
    let mut tasks = JoinSet::new();

    for path in files {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn_blocking(move || {
            let _permit = permit;
            let result = extract_file(&pipeline, &path);
            (path, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (path, result) = joined?;
        pb.inc(1);

        match result {
            Ok(run) => results.push(FileResult {
                path,
                run: Some(run),
                error: None,
            }),
            Err(e) => {
                let error_msg = format!("{:#}", e);
                if args.continue_on_error {
                    warn!("Failed to process {}: {}", path.display(), error_msg);
                    results.push(FileResult {
                        path,
                        run: None,
                        error: Some(error_msg),
                    });
                } else {
                    error!("Failed to process {}: {}", path.display(), error_msg);
                    pb.abandon();
                    tasks.abort_all();
                    anyhow::bail!("Processing failed for {}: {}", path.display(), error_msg);
                }
            }
        }
    }

    pb.finish_and_clear();
    results.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            if let Some(run) = &result.run {
                let output_name = result
                    .path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document");
                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

                fs::write(&output_path, format_run(run, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    let invalid = results
        .iter()
        .filter_map(|r| r.run.as_ref())
        .filter(|run| run.documents.iter().any(|doc| !doc.is_valid()))
        .count();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} extracted ({} with validation errors), {} failed",
        style(results.len() - failed.len()).green(),
        style(invalid).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &failed {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    println!();
    println!("{}", style("Metrics:").bold());
    print!("{}", pipeline.metrics().render());

    Ok(())
}

fn extract_file(pipeline: &ExtractionPipeline, path: &Path) -> anyhow::Result<ExtractionRun> {
    let data = fs::read(path)?;
    Ok(pipeline.extract(&data)?)
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "request_id",
        "doc_type",
        "fields",
        "valid",
        "errors",
        "warnings",
        "ocr_confidence",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result.path.file_name().and_then(|s| s.to_str()).unwrap_or("");

        match (&result.run, result.run.as_ref().and_then(|run| run.documents.first())) {
            (Some(run), Some(doc)) => {
                wtr.write_record([
                    filename,
                    "success",
                    &run.request_id.to_string(),
                    doc.doc_type.as_str(),
                    &doc.fields.len().to_string(),
                    &doc.is_valid().to_string(),
                    &doc.validation.errors.len().to_string(),
                    &doc.validation.warnings.len().to_string(),
                    &format!("{:.2}", run.metrics.ocr_avg_confidence),
                    &format!("{:.0}", run.metrics.processing_time_ms),
                    "",
                ])?;
            }
            _ => {
                wtr.write_record([
                    filename,
                    "error",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    result.error.as_deref().unwrap_or(""),
                ])?;
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
