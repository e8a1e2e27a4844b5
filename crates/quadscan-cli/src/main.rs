// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quadscan command-line front end.
//
// Replays still images through the scan engine as if they were a steady
// camera feed, writes every accepted document as PNG, and prints a JSON
// summary of what happened to each image.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use quadscan_core::{DocumentKind, Frame, Result, RectifyMode, Rotation, ScanConfig, ScanError};
use quadscan_engine::{EngineCommand, FrameOutcome, ScanEngine, ScanEvent};
use quadscan_vision::ImageProcessor;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quadscan", version)]
#[command(about = "Detect, stabilise and rectify documents in camera frames")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Feed still images to the engine as a stream of identical frames
    Replay(ReplayArgs),
    /// Write the default configuration as JSON
    Config {
        #[arg(long)]
        write: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Images to replay, in order
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// JSON configuration file; defaults apply to missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Document preset (aadhaar, pan, passport, a4, visiting_card, usd)
    #[arg(long, conflicts_with = "aspect")]
    document: Option<String>,

    /// Expected width / height of the document
    #[arg(long)]
    aspect: Option<f64>,

    /// Frames generated from each image
    #[arg(long, default_value_t = 5)]
    frames_per_image: u32,

    /// Spacing of frame timestamps in milliseconds
    #[arg(long, default_value_t = 100)]
    interval_ms: u64,

    /// Clockwise rotation attached to every frame (0, 90, 180, 270)
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rotation: i32,

    /// Directory for rectified PNG files
    #[arg(long, default_value = "quadscan-out")]
    out: PathBuf,

    /// Keep the lock after a capture instead of starting over
    #[arg(long)]
    no_auto_capture: bool,

    /// Cap the output at the source resolution
    #[arg(long)]
    simple: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Replay(args) => replay(&args).and_then(|summary| {
            let text = serde_json::to_string_pretty(&summary)?;
            println!("{text}");
            Ok(())
        }),
        Command::Config { write } => ScanConfig::default().save(&write).map(|()| {
            info!(path = %write.display(), "Default configuration written");
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("quadscan: {e}");
            ExitCode::FAILURE
        }
    }
}

// -- Replay -------------------------------------------------------------------

fn load_config(args: &ReplayArgs) -> Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };
    if args.no_auto_capture {
        config.stability.auto_capture = false;
    }
    if args.simple {
        config.rectify.mode = RectifyMode::Simple;
    }
    config.validate()?;
    Ok(config)
}

fn region_command(args: &ReplayArgs) -> Result<Option<EngineCommand>> {
    if let Some(name) = &args.document {
        let kind = DocumentKind::from_name(name)
            .ok_or_else(|| ScanError::InvalidInput(format!("unknown document preset: {name}")))?;
        return Ok(Some(EngineCommand::for_document(kind)));
    }
    Ok(args.aspect.map(|ratio| EngineCommand::for_document(DocumentKind::Custom(ratio))))
}

/// Replay every image and return the summary document.
fn replay(args: &ReplayArgs) -> Result<Value> {
    let config = load_config(args)?;
    let rotation = Rotation::from_degrees(args.rotation)
        .ok_or_else(|| ScanError::InvalidInput(format!("rotation must be a right angle, got {}", args.rotation)))?;
    std::fs::create_dir_all(&args.out)?;

    let mut engine = ScanEngine::new(config)?;
    let mut events = Vec::new();
    if let Some(command) = region_command(args)? {
        engine.handle_command(command, &mut events)?;
    }

    let interval = Duration::from_millis(args.interval_ms);
    let mut clock = Duration::ZERO;
    let mut reports = Vec::with_capacity(args.images.len());

    for path in &args.images {
        let image = ImageProcessor::open(path)?.into_rgb();
        let (width, height) = image.dimensions();
        let pixels = image.into_raw();

        let mut outcomes: BTreeMap<&'static str, u32> = BTreeMap::new();
        let mut written = Vec::new();
        let mut feedback = Vec::new();
        let mut manual_crop_needed = false;

        for _ in 0..args.frames_per_image {
            let frame = Frame::new(width, height, pixels.clone(), rotation, clock);
            clock += interval;

            events.clear();
            let outcome = engine.process_frame(frame, &mut events);
            *outcomes.entry(outcome_label(&outcome)).or_default() += 1;

            for event in events.drain(..) {
                match event {
                    ScanEvent::DocumentAccepted {
                        corners,
                        image,
                        strategy,
                        captured_at,
                        ..
                    } => {
                        let file = output_path(&args.out, path, written.len());
                        ImageProcessor::from_rgb(image).save(&file)?;
                        info!(file = %file.display(), strategy = strategy.label(), "Rectified document written");
                        written.push(json!({
                            "file": file.display().to_string(),
                            "strategy": strategy.label(),
                            "corners": corners.to_flat(),
                            "captured_at": captured_at.to_rfc3339(),
                        }));
                    }
                    ScanEvent::ManualCropNeeded { .. } => manual_crop_needed = true,
                    ScanEvent::Feedback(kind) => feedback.push(kind.message()),
                    ScanEvent::LiveContours { .. } | ScanEvent::OverlayRegion(_) => {}
                }
            }
        }

        if written.is_empty() {
            warn!(image = %path.display(), "No document accepted");
        }
        reports.push(json!({
            "image": path.display().to_string(),
            "frames": args.frames_per_image,
            "outcomes": outcomes,
            "accepted": written,
            "feedback": feedback,
            "manual_crop_needed": manual_crop_needed,
        }));
    }

    let snapshot = engine.snapshot();
    Ok(json!({
        "session": engine.session_id().to_string(),
        "frames_processed": snapshot.frames_processed,
        "documents_accepted": snapshot.documents_accepted,
        "final_state": snapshot.state,
        "images": reports,
    }))
}

fn outcome_label(outcome: &FrameOutcome) -> &'static str {
    match outcome {
        FrameOutcome::Tracking { .. } => "tracking",
        FrameOutcome::Accepted(_) => "accepted",
        FrameOutcome::Blurry { .. } => "blurry",
        FrameOutcome::CaptureFailed => "capture_failed",
        FrameOutcome::Missed(_) => "missed",
    }
}

fn output_path(out: &Path, source: &Path, index: usize) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    out.join(format!("{stem}-{index}.png"))
}
