//! Extract command - run one document through the pipeline.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use idp_core::ExtractionRun;

use super::{build_pipeline, load_config};

/// Arguments for the extract command.
#[derive(Args)]
pub struct ExtractArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Do not write the result to the analytics store
    #[arg(long)]
    no_persist: bool,

    /// OCR model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output, one row per field
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ExtractArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = load_config(config_path)?;
    if let Some(model_dir) = &args.model_dir {
        config.ocr.model_dir = model_dir.clone();
    }
    if args.no_persist {
        config.storage.database_path = None;
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Extracting file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    pb.set_message("Loading OCR models...");
    let pipeline = build_pipeline(config)?;

    pb.set_message("Extracting fields...");
    let data = fs::read(&args.input)?;
    let run = tokio::task::spawn_blocking(move || pipeline.extract(&data)).await??;

    pb.finish_and_clear();

    let output = format_run(&run, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    let invalid = run.documents.iter().filter(|doc| !doc.is_valid()).count();
    if invalid > 0 {
        eprintln!(
            "{} {} document(s) failed validation",
            style("⚠").yellow(),
            invalid
        );
    }

    debug!("Total time: {:?}", start.elapsed());

    Ok(())
}

/// Render a run in the requested format.
pub fn format_run(run: &ExtractionRun, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(run)?),
        OutputFormat::Csv => format_csv(run),
        OutputFormat::Text => Ok(format_text(run)),
    }
}

fn format_csv(run: &ExtractionRun) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "request_id",
        "document",
        "doc_type",
        "field",
        "value",
        "confidence",
        "source",
        "page",
        "valid",
    ])?;

    let request_id = run.request_id.to_string();
    for (index, doc) in run.documents.iter().enumerate() {
        for (name, field) in &doc.fields {
            let candidate = &field.candidate;
            wtr.write_record([
                request_id.as_str(),
                &index.to_string(),
                doc.doc_type.as_str(),
                name,
                &candidate.value.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                &format!("{:.2}", candidate.confidence),
                &format!("{:?}", candidate.source).to_lowercase(),
                &candidate.page.to_string(),
                &field.valid.to_string(),
            ])?;
        }
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(run: &ExtractionRun) -> String {
    let mut output = String::new();

    output.push_str(&format!("Request: {}\n", run.request_id));
    output.push_str(&format!(
        "OCR confidence: {:.1}%  Time: {:.0}ms\n",
        run.metrics.ocr_avg_confidence * 100.0,
        run.metrics.processing_time_ms
    ));

    for doc in &run.documents {
        output.push('\n');
        output.push_str(&format!(
            "Document type: {} ({})\n",
            doc.doc_type,
            if doc.is_valid() { "valid" } else { "invalid" }
        ));

        output.push_str("Fields:\n");
        for (name, field) in &doc.fields {
            let value = field
                .candidate
                .value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
            let marker = if field.valid { " " } else { "!" };
            output.push_str(&format!(
                " {} {:<16} {:<24} {:.2} p{}\n",
                marker, name, value, field.candidate.confidence, field.candidate.page
            ));
        }

        for message in &doc.validation.errors {
            output.push_str(&format!("  error   {}: {}\n", message.field, message.message));
        }
        for message in &doc.validation.warnings {
            output.push_str(&format!("  warning {}: {}\n", message.field, message.message));
        }
    }

    if !run.analytics.top_failures.is_empty() {
        output.push_str("\nMost frequent failures:\n");
        for failure in &run.analytics.top_failures {
            output.push_str(&format!("  {:<16} {}\n", failure.field, failure.failure_count));
        }
    }

    output
}
