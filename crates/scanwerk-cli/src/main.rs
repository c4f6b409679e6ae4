// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// scanwerk: turn a set of document photos into one rectified PDF.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use scanwerk_batch::{BatchOrchestrator, BatchReport, DirectoryUploader, upload_document};
use scanwerk_core::human_errors::humanize_kind;
use scanwerk_core::{PageOutcome, QualityPreset, ScanConfig, SourceImage};
use scanwerk_imaging::DocumentAssembler;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "scanwerk", version, about = "Rectify document photos and assemble them into a PDF")]
struct Cli {
    /// Photos to process, in page order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where to write the assembled PDF.
    #[arg(short, long, default_value = "scan.pdf")]
    output: PathBuf,

    /// Quality preset (fast, balanced, best). Ignored when --config is given.
    #[arg(short, long, default_value = "balanced")]
    preset: QualityPreset,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Document title stored in the PDF metadata.
    #[arg(long, default_value = "Scanned document")]
    title: String,

    /// Write each page's thumbnail into this directory.
    #[arg(long)]
    thumbnails: Option<PathBuf>,

    /// Write each processed page as a JPEG into this directory.
    #[arg(long)]
    pages: Option<PathBuf>,

    /// Write the batch report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Process pages one at a time.
    #[arg(long)]
    sequential: bool,

    /// Also hand the finished PDF to a directory uploader.
    #[arg(long)]
    upload_dir: Option<PathBuf>,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut config = match &self.config {
            Some(path) => ScanConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ScanConfig::from_preset(self.preset),
        };
        if self.sequential {
            config.parallel = false;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.scan_config()?;
    info!(preset = ?config.preset, inputs = cli.inputs.len(), "Scanwerk starting");

    let orchestrator = Arc::new(BatchOrchestrator::new(config.clone())?);

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing the current group");
            token.cancel();
        }
    });

    let mut job = orchestrator.new_job();
    for path in &cli.inputs {
        let source = read_source(path)?;
        orchestrator
            .accept_capture(&mut job, source)
            .with_context(|| format!("capture refused for {}", path.display()))?;
    }

    let report = orchestrator
        .clone()
        .process_async(job, |done: usize, total: usize| {
            info!(done, total, "Progress");
        })
        .await?;

    log_failures(&report, &cli.inputs);

    if let Some(dir) = &cli.thumbnails {
        write_page_files(dir, "thumb", &report, |page| &page.thumbnail)?;
    }
    if let Some(dir) = &cli.pages {
        write_page_files(dir, "page", &report, |page| &page.output)?;
    }
    if let Some(path) = &cli.report {
        write_report(path, &report)?;
    }

    if report.cancelled {
        bail!("batch cancelled after {} processed page(s)", report.processed_count());
    }
    if report.processed_count() == 0 {
        bail!("no page could be processed");
    }

    let document = DocumentAssembler::new(&cli.title, config.layout)
        .assemble_outcomes(&report.outcomes)
        .context("failed to assemble PDF")?;
    document
        .write_to(&cli.output)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;
    info!(
        path = %cli.output.display(),
        pages = document.page_count,
        bytes = document.bytes.len(),
        "PDF written"
    );

    if let Some(dir) = &cli.upload_dir {
        let name = cli
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scan.pdf".into());
        upload_document(&DirectoryUploader::new(dir), &name, &document).await?;
    }

    Ok(())
}

fn read_source(path: &Path) -> Result<SourceImage> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    Ok(SourceImage::new(bytes, SourceImage::mime_for_extension(ext)))
}

fn log_failures(report: &BatchReport, inputs: &[PathBuf]) {
    for outcome in &report.outcomes {
        if let PageOutcome::Failed(failed) = outcome {
            let human = humanize_kind(failed.kind, &failed.reason);
            let file = inputs
                .get(failed.meta.index)
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            warn!(
                index = failed.meta.index,
                file,
                reason = %failed.reason,
                suggestion = %human.suggestion,
                "{}",
                human.message
            );
        }
    }
}

fn write_page_files<F>(dir: &Path, prefix: &str, report: &BatchReport, bytes: F) -> Result<()>
where
    F: Fn(&scanwerk_core::ProcessedPage) -> &Vec<u8>,
{
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for page in report.processed_pages() {
        let path = dir.join(page_file_name(prefix, page.meta.index));
        std::fs::write(&path, bytes(page))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn page_file_name(prefix: &str, index: usize) -> String {
    format!("{prefix}-{:03}.jpg", index + 1)
}

fn write_report(path: &Path, report: &BatchReport) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report).context("failed to serialise report")?;
    Ok(())
}
