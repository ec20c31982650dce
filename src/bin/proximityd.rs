//! proximityd - flag people standing too close together in a video.
//!
//! Reads frames from a video file, an image directory or a `stub://` source,
//! runs the detector on each frame, marks detections whose centroids are
//! closer than the configured distance, and hands annotated frames to the
//! configured outputs: an annotated video, a frames directory and a
//! JSON-lines report, in any combination.
//! Ctrl-C stops the stream after the current frame.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use proximity_watch::{
    drive, open_backend, Annotator, CancelToken, FileConfig, FileSource, FrameDirectorySink,
    FrameSink, JsonReportSink, PipelineConfig, ProcessedFrame, StreamLoop, Termination,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Detect social-distancing violations in a video stream"
)]
struct Args {
    /// Video file, directory of images, or stub://<name>.
    input: String,

    /// Write the annotated stream as an MJPEG video (25 fps) to this file.
    #[arg(short, long, value_name = "VIDEO")]
    output: Option<PathBuf>,

    /// Write annotated frames as frame<N>.jpg into this directory.
    #[arg(long, value_name = "DIR")]
    frames_dir: Option<PathBuf>,

    /// Write a JSON-lines report of every frame to this file.
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Object class to analyze (overrides the configured target).
    #[arg(short, long, value_name = "CLASS")]
    target: Option<String>,

    /// Pipeline config file (TOML or JSON).
    #[arg(long, env = "PROXIMITY_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

/// Feeds per-frame counts into the stderr progress line.
struct ProgressSink {
    progress: Option<ui::FrameProgress>,
}

impl FrameSink for ProgressSink {
    fn accept(&mut self, frame: &ProcessedFrame) -> Result<()> {
        if let Some(progress) = self.progress.as_mut() {
            progress.record(frame.violation_count());
        }
        Ok(())
    }

    fn finish(&mut self, _termination: Termination) -> Result<()> {
        if let Some(progress) = self.progress.take() {
            progress.finish();
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(args.ui, is_tty, !stdout_is_tty);

    let config = {
        let _stage = ui.stage("Load configuration");
        let config = match &args.config {
            Some(path) => PipelineConfig::load_from(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::load()?,
        };
        match &args.target {
            Some(target) => config.with_target_class(target)?,
            None => config,
        }
    };
    let config = Arc::new(config);

    let detector = {
        let _stage = ui.stage("Load detector");
        open_backend(&config.detector, config.use_gpu)?
    };
    let annotator = Annotator::from_settings(&config.annotation)?;

    let source = {
        let _stage = ui.stage("Open input");
        FileSource::new(FileConfig {
            path: args.input.clone(),
            max_frames: args.max_frames,
            ..FileConfig::default()
        })?
    };

    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
    if let Some(path) = &args.output {
        sinks.push(video_sink(path)?);
    }
    if let Some(dir) = &args.frames_dir {
        sinks.push(Box::new(FrameDirectorySink::new(dir)?));
    }
    if let Some(path) = &args.report {
        sinks.push(Box::new(JsonReportSink::create(path)?));
    }
    if sinks.is_empty() {
        log::warn!("no output, frames dir or report given; frames will be analyzed and discarded");
    }
    sinks.push(Box::new(ProgressSink {
        progress: Some(ui.frames()),
    }));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received, stopping after the current frame");
        handler_token.cancel();
    })
    .context("error setting Ctrl-C handler")?;

    let stream = StreamLoop::start(source, detector, annotator, config.clone(), cancel)?;
    let summary = drive(stream, &mut sinks)?;

    log::info!(
        "processed {} frames ({:?}): {} violations total, at most {} in one frame",
        summary.frames,
        summary.termination,
        summary.total_violations,
        summary.max_violations
    );
    Ok(())
}

#[cfg(feature = "output-video-ffmpeg")]
fn video_sink(path: &std::path::Path) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(proximity_watch::VideoFileSink::new(path)))
}

#[cfg(not(feature = "output-video-ffmpeg"))]
fn video_sink(path: &std::path::Path) -> Result<Box<dyn FrameSink>> {
    Err(anyhow::anyhow!(
        "cannot write {}: video output requires the output-video-ffmpeg feature",
        path.display()
    ))
}
