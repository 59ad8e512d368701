// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// qrswap command line — `scan` lists the codes on a page as JSON, `replace`
// swaps one of them for a code carrying new text.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use qrswap_core::config::{OcclusionPolicy, PipelineConfig};
use qrswap_core::error::QrSwapError;
use qrswap_core::human_errors::humanize_error;
use qrswap_core::types::{Detection, DetectionId, Quad};
use qrswap_session::{ResourceHandle, ScanView, Session, SourceArtifact};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "qrswap")]
#[command(about = "Find QR codes in PDFs and images and replace them with new ones")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the QR codes found on one page as JSON.
    Scan {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Also write the rendered page as PNG.
        #[arg(long)]
        preview: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Replace one QR code with a code encoding new text.
    Replace {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// New text or URL for the code.
        #[arg(long)]
        text: String,
        /// Code to replace, as printed by `scan` (e.g. qr-1-0).
        #[arg(long, conflicts_with = "index")]
        id: Option<String>,
        /// Position of the code in the page's scan results.
        #[arg(long)]
        index: Option<u32>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Where to write the modified file.
        #[arg(long)]
        output: PathBuf,
        /// Also write the edited page as PNG.
        #[arg(long)]
        preview: Option<PathBuf>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Occlusion {
    /// Paint out the exact detected outline.
    Quad,
    /// Paint out the outline's bounding box.
    Bbox,
}

#[derive(Debug, Args)]
struct PipelineArgs {
    /// Render scale for document pages, in pixels per point.
    #[arg(long, default_value_t = 2.0)]
    scale: f64,
    #[arg(long, value_enum, default_value_t = Occlusion::Quad)]
    occlusion: Occlusion,
}

impl PipelineArgs {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            render_scale: self.scale,
            occlusion: match self.occlusion {
                Occlusion::Quad => OcclusionPolicy::Quadrilateral,
                Occlusion::Bbox => OcclusionPolicy::BoundingBox,
            },
            ..PipelineConfig::default()
        }
    }
}

#[derive(Debug, Serialize)]
struct ScanOutput {
    file: String,
    media_type: &'static str,
    page: u32,
    page_count: Option<u32>,
    /// Painting operations the renderer dropped; non-zero means codes may
    /// have been missed.
    skipped_content: usize,
    detections: Vec<DetectionOutput>,
}

#[derive(Debug, Serialize)]
struct DetectionOutput {
    id: String,
    index: u32,
    payload: String,
    quad: Quad,
}

impl From<&Detection> for DetectionOutput {
    fn from(d: &Detection) -> Self {
        Self {
            id: d.id.to_string(),
            index: d.id.index,
            payload: d.payload.clone(),
            quad: d.quad,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplaceOutput {
    file: String,
    output: String,
    media_type: &'static str,
    page: u32,
    id: String,
    previous: String,
    text: String,
    sha256: String,
}

pub async fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Scan {
            file,
            page,
            preview,
            pipeline,
        } => run_scan(&file, page, preview.as_deref(), &pipeline).await,
        Commands::Replace {
            file,
            text,
            id,
            index,
            page,
            output,
            preview,
            pipeline,
        } => {
            let index = target_index(id.as_deref(), index)?;
            run_replace(
                &file,
                &text,
                index,
                page,
                &output,
                preview.as_deref(),
                &pipeline,
            )
            .await
        }
    }
}

/// Render an error for the terminal: the plain-language message first,
/// then the full technical chain.
pub fn describe_error(error: &anyhow::Error) -> String {
    match error.chain().find_map(|e| e.downcast_ref::<QrSwapError>()) {
        Some(err) => {
            let human = humanize_error(err);
            format!("{}\n{}\n\ncaused by: {error:#}", human.message, human.suggestion)
        }
        None => format!("{error:#}"),
    }
}

async fn run_scan(
    file: &Path,
    page: u32,
    preview: Option<&Path>,
    pipeline: &PipelineArgs,
) -> Result<()> {
    let session = Session::new(pipeline.config());
    let (source, view) = open_page(&session, file, page).await?;

    if let Some(path) = preview {
        write_resource(&session, &view.preview, path).await?;
    }

    let payload = ScanOutput {
        file: file.display().to_string(),
        media_type: source.kind.mime_type(),
        page: view.page,
        page_count: view.page_count,
        skipped_content: view.skipped_content,
        detections: view.detections.iter().map(DetectionOutput::from).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn run_replace(
    file: &Path,
    text: &str,
    index: u32,
    page: u32,
    output: &Path,
    preview: Option<&Path>,
    pipeline: &PipelineArgs,
) -> Result<()> {
    let session = Session::new(pipeline.config());
    let (source, view) = open_page(&session, file, page).await?;
    let detection = pick(&view.detections, index, page)?;

    let replaced = session
        .replace(detection.id, text)
        .await
        .with_context(|| format!("failed to replace QR code {}", detection.id))?;

    write_resource(&session, &replaced.artifact, output).await?;
    if let Some(path) = preview {
        write_resource(&session, &replaced.preview, path).await?;
    }
    info!(output = %output.display(), "Modified file written");

    let payload = ReplaceOutput {
        file: file.display().to_string(),
        output: output.display().to_string(),
        media_type: source.kind.mime_type(),
        page,
        id: detection.id.to_string(),
        previous: detection.payload.clone(),
        text: text.to_string(),
        sha256: replaced.digest,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Load `file` into the session and scan `page` of it.
async fn open_page(
    session: &Session,
    file: &Path,
    page: u32,
) -> Result<(SourceArtifact, ScanView)> {
    ensure_file_exists(file)?;
    let source = SourceArtifact::from_path(file)
        .with_context(|| format!("failed to open {}", file.display()))?;

    let mut view = session
        .load(source.clone())
        .await
        .with_context(|| format!("failed to scan {}", file.display()))?;
    if page != 1 {
        view = session
            .goto_page(page)
            .await
            .with_context(|| format!("failed to scan page {page}"))?;
    }
    if view.skipped_content > 0 {
        warn!(
            file = %file.display(),
            page = view.page,
            skipped = view.skipped_content,
            "Some page content could not be rendered; QR codes in it were not scanned"
        );
    }
    Ok((source, view))
}

async fn write_resource(session: &Session, handle: &ResourceHandle, path: &Path) -> Result<()> {
    let resource = session
        .resource(handle)
        .await
        .with_context(|| format!("resource {handle} is no longer available"))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, &*resource.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn ensure_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

/// Position of the code to replace within the page's scan results.
///
/// Scan numbers restart in every process, so an id printed by an earlier
/// `scan` run is matched by its position on the page.
fn target_index(id: Option<&str>, index: Option<u32>) -> Result<u32> {
    match (id, index) {
        (Some(id), _) => {
            let id: DetectionId = id
                .parse()
                .with_context(|| format!("invalid --id {id:?}"))?;
            Ok(id.index)
        }
        (None, Some(index)) => Ok(index),
        (None, None) => Ok(0),
    }
}

fn pick(detections: &[Detection], index: u32, page: u32) -> Result<&Detection> {
    if detections.is_empty() {
        anyhow::bail!("no QR codes found on page {page}");
    }
    detections.get(index as usize).with_context(|| {
        format!(
            "page {page} has {} QR code(s); there is no code at index {index}",
            detections.len()
        )
    })
}
