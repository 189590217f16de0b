//! Inspect command - describe media files as model inputs.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use kindml_adapters::{FsMediaSource, ImageSequence};
use kindml_core::{MediaHandle, MediaKind};
use serde::Serialize;
use tracing::warn;

use super::ExitCode;
use crate::config::AppConfig;

/// Arguments for the inspect command
#[derive(Args)]
pub struct InspectArgs {
    /// Image files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Treat all images found as the frames of one looping video
    #[arg(long)]
    pub sequence: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// One line of inspect output.
#[derive(Debug, Serialize)]
pub struct MediaReport {
    /// File the media was read from, or the first path of a sequence.
    pub path: PathBuf,
    /// Media variant the handle would be passed as.
    pub kind: MediaKind,
    /// Width in pixels, if known.
    pub width: Option<u32>,
    /// Height in pixels, if known.
    pub height: Option<u32>,
    /// Whether a prediction could read the media right away.
    pub ready: bool,
    /// Number of frames in a sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<usize>,
}

impl MediaReport {
    /// Describes a media handle.
    #[must_use]
    pub fn new(path: &Path, media: &MediaHandle) -> Self {
        let (width, height) = media.dimensions().unzip();
        Self {
            path: path.to_path_buf(),
            kind: media.kind(),
            width,
            height,
            ready: media.is_ready(),
            frames: None,
        }
    }
}

/// Run the inspect command.
pub fn run(args: &InspectArgs, config: &AppConfig) -> Result<ExitCode> {
    let recursive = args.recursive || config.general.recursive.unwrap_or(false);
    let pretty = args.pretty || config.output.pretty.unwrap_or(false);
    let source = FsMediaSource::new(args.paths.clone(), recursive);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    if args.sequence {
        let frames = source.collect_files();
        let Some(first) = frames.first().cloned() else {
            bail!("No images found");
        };
        let count = frames.len();
        let video = ImageSequence::from_files(frames)?;
        let mut report = MediaReport::new(&first, &MediaHandle::from(video));
        report.frames = Some(count);
        write_report(&mut out, &report, pretty)?;
        return Ok(ExitCode::Success);
    }

    let mut failures = 0usize;
    let mut seen = 0usize;
    for (path, media) in source.media() {
        seen += 1;
        match media {
            Ok(media) => write_report(&mut out, &MediaReport::new(&path, &media), pretty)?,
            Err(e) => {
                warn!("Skipping {}: {e:#}", path.display());
                failures += 1;
            }
        }
    }

    if seen == 0 {
        warn!("No images found");
    }

    Ok(if failures == 0 {
        ExitCode::Success
    } else {
        ExitCode::Partial
    })
}

fn write_report(out: &mut impl Write, report: &MediaReport, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(report)
    } else {
        serde_json::to_string(report)
    }
    .context("Failed to serialize report")?;
    writeln!(out, "{json}").context("Failed to write output")?;
    Ok(())
}
